//! 命令总线统一错误定义
//!
//! - `CommandError`：分发链路内部（解析、调用、审计、线程池）的错误集合；
//! - `ProcessingFailure`：请求/响应模式下交付给调用方的统一失败，
//!   其消息与根因消息逐字一致。
//!
use std::error::Error as StdError;
use std::sync::Arc;

/// 处理器可抛出的任意错误（`?` 或 `"msg".into()` 即可构造）
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// 处理器返回值别名
pub type HandlerResult<T> = Result<T, HandlerError>;

#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone)]
pub enum CommandError {
    // --- 解析/调用 ---
    #[error("no command handler found for {command}")]
    HandlerNotFound { command: &'static str },

    /// 处理器执行失败；消息为根因消息原文，panic 时 `cause` 为空
    #[error("{message}")]
    HandlerInvocation {
        message: String,
        #[source]
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("handler already registered: command={command}")]
    AlreadyRegistered { command: &'static str },

    // --- 审计记录 ---
    #[error("command source already completed: {key}")]
    AlreadyCompleted { key: String },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error("command source repository error: {reason}")]
    Repository { reason: String },

    // --- 线程池/运行时 ---
    #[error("worker pool rejected command {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    #[error("worker pool is shut down")]
    PoolShutdown,

    #[error("command dispatch dropped before completion")]
    Dropped,

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("runtime error: {reason}")]
    Runtime { reason: String },
}

impl CommandError {
    pub fn repository(reason: impl Into<String>) -> Self {
        Self::Repository {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// 由处理器返回的错误构造调用失败，保留原错误作为根因
    pub fn invocation(err: HandlerError) -> Self {
        Self::HandlerInvocation {
            message: err.to_string(),
            cause: Some(Arc::from(err)),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// 请求/响应模式下调用方看到的统一失败
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct ProcessingFailure {
    message: String,
    #[source]
    cause: CommandError,
}

impl ProcessingFailure {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> &CommandError {
        &self.cause
    }

    pub fn into_cause(self) -> CommandError {
        self.cause
    }
}

impl From<CommandError> for ProcessingFailure {
    fn from(cause: CommandError) -> Self {
        Self {
            message: cause.to_string(),
            cause,
        }
    }
}
