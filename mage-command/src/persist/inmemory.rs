//! 内存版审计存储
//!
//! 以 `DashMap` 保存记录，按主键覆盖写入；`find_by_bucket` 按聚簇键倒序
//! （最新在前）返回某个分区内的记录。
//!
use crate::command_source::{CommandSource, CommandSourceKey};
use crate::error::CommandError;
use crate::persist::CommandSourceRepository;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryCommandSourceRepository {
    records: DashMap<CommandSourceKey, CommandSource>,
}

impl InMemoryCommandSourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 某个 (source, bucket) 分区内的全部记录，最新在前
    pub fn find_by_bucket(&self, source: &str, bucket: &str) -> Vec<CommandSource> {
        let mut found: Vec<CommandSource> = self
            .records
            .iter()
            .filter(|e| e.key().source() == source && e.key().bucket() == bucket)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| b.key().created_on().cmp(&a.key().created_on()));
        found
    }

    pub fn all(&self) -> Vec<CommandSource> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }
}

#[async_trait]
impl CommandSourceRepository for InMemoryCommandSourceRepository {
    async fn save(&self, record: CommandSource) -> Result<(), CommandError> {
        self.records.insert(record.key().clone(), record);
        Ok(())
    }

    async fn find_one(
        &self,
        key: &CommandSourceKey,
    ) -> Result<Option<CommandSource>, CommandError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }
}
