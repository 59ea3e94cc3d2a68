//! 审计存储（persist）
//!
//! 命令总线对审计存储只要求两个操作：按主键写入（插入或覆盖）与按主键读取。
//! 具体存储后端由上层实现 [`CommandSourceRepository`] 并注入；
//! 内存实现用于测试与示例。
//!
mod command_source_repository;
mod inmemory;

pub use command_source_repository::CommandSourceRepository;
pub use inmemory::InMemoryCommandSourceRepository;
