//! 命令审计记录（CommandSource）
//!
//! 每次分发尝试对应一条记录：分发开始时以“待处理”状态写入，
//! 结束时恰好一次地迁移到 `processed` 或 `failed` 终态。核心从不删除记录。
//!
use crate::error::CommandError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// 审计记录主键
///
/// - `source`：所属应用/服务实例（分区键）
/// - `bucket`：按日分区，取 `created_on` 的 ISO 日期（分区键）
/// - `created_on`：分发时间（聚簇键，倒序）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandSourceKey {
    source: String,
    bucket: String,
    created_on: DateTime<Utc>,
}

impl CommandSourceKey {
    pub fn new(source: impl Into<String>, created_on: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            bucket: bucket_of(created_on),
            created_on,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }
}

impl fmt::Display for CommandSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.source,
            self.bucket,
            self.created_on.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }
}

/// 日期分区：`YYYY-MM-DD`
pub fn bucket_of(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// 审计记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Processed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSource {
    #[serde(flatten)]
    key: CommandSourceKey,
    /// 序列化后的命令
    command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_message: Option<String>,
}

impl CommandSource {
    /// 新建待处理记录
    pub fn pending(key: CommandSourceKey, command: impl Into<String>) -> Self {
        Self {
            key,
            command: command.into(),
            processed: None,
            failed: None,
            failure_message: None,
        }
    }

    pub fn key(&self) -> &CommandSourceKey {
        &self.key
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn processed(&self) -> Option<bool> {
        self.processed
    }

    pub fn failed(&self) -> Option<bool> {
        self.failed
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    pub fn status(&self) -> CommandStatus {
        if self.failed == Some(true) {
            CommandStatus::Failed
        } else if self.processed == Some(true) {
            CommandStatus::Processed
        } else {
            CommandStatus::Pending
        }
    }

    /// 迁移到终态：`failure` 为空即成功；已是终态时报错
    pub fn complete(&mut self, failure: Option<&str>) -> Result<(), CommandError> {
        if self.status() != CommandStatus::Pending {
            return Err(CommandError::AlreadyCompleted {
                key: self.key.to_string(),
            });
        }

        match failure {
            Some(message) => {
                self.failed = Some(true);
                self.failure_message = Some(message.to_string());
            }
            None => self.processed = Some(true),
        }

        Ok(())
    }
}

/// 单调时钟：同一实例产出的 `created_on` 严格递增（纳秒精度），
/// 保证同一总线的两次分发不会落在同一主键上。
#[derive(Debug, Default)]
pub struct SourceClock {
    last_nanos: AtomicI64,
}

impl SourceClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.tick(Utc::now())
    }

    fn tick(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let wall_nanos = wall.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut last = self.last_nanos.load(Ordering::Relaxed);

        loop {
            let next = if wall_nanos > last { wall_nanos } else { last + 1 };
            match self.last_nanos.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return DateTime::from_timestamp_nanos(next),
                Err(current) => last = current,
            }
        }
    }

    pub fn next_key(&self, source: &str) -> CommandSourceKey {
        CommandSourceKey::new(source, self.now())
    }
}
