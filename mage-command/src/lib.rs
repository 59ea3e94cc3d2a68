//! 进程内 CQRS 命令总线
//!
//! 提交的命令先写入审计记录，再路由到唯一处理器并在有界工作池中执行，
//! 最后把结果回写审计记录；请求/响应模式下通过 [`CommandCallback`] 交付结果。
//!
extern crate self as mage_command;

pub mod aggregate;
pub mod callback;
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod command_source;
pub mod config;
pub mod error;
pub mod gateway;
pub mod persist;
pub mod registry;
pub mod worker_pool;

pub use aggregate::{Aggregate, EntryPoints};
pub use callback::CommandCallback;
pub use command::{Ancestry, Command, CommandType};
pub use command_bus::CommandBus;
pub use command_handler::CommandHandler;
pub use command_source::{CommandSource, CommandSourceKey, CommandStatus};
pub use config::CommandConfig;
pub use error::{CommandError, HandlerError, HandlerResult, ProcessingFailure};
pub use gateway::CommandGateway;
pub use persist::{CommandSourceRepository, InMemoryCommandSourceRepository};
pub use registry::HandlerRegistry;
pub use worker_pool::SaturationPolicy;

/// `#[derive(Command)]`，与同名 trait 分属不同命名空间
pub use mage_command_macros::Command;
