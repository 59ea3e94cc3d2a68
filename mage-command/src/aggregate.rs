//! 聚合（Aggregate）
//!
//! 持有状态并暴露零个或多个命令处理入口的组件。聚合实例由进程显式构造，
//! 在启动时交给 [`RegistryBuilder`](crate::registry::RegistryBuilder)，
//! 总线本身不做任何发现。
//!
use crate::command::Command;
use crate::command_handler::CommandHandler;
use crate::registry::HandlerEntry;
use std::sync::Arc;

pub trait Aggregate: Send + Sync + Sized + 'static {
    /// 聚合的稳定名称（日志与诊断用）
    const NAME: &'static str;

    /// 声明本聚合的命令处理入口，声明顺序即枚举顺序
    fn entry_points(entry_points: &mut EntryPoints<Self>);
}

/// 单个聚合的入口声明收集器
pub struct EntryPoints<A> {
    aggregate: Arc<A>,
    entries: Vec<HandlerEntry>,
}

impl<A: Aggregate> EntryPoints<A> {
    pub(crate) fn new(aggregate: Arc<A>) -> Self {
        Self {
            aggregate,
            entries: Vec::new(),
        }
    }

    /// 声明 `A` 处理命令 `C`
    pub fn handle<C>(&mut self) -> &mut Self
    where
        C: Command,
        A: CommandHandler<C>,
    {
        self.entries.push(HandlerEntry::new::<C, A>(
            A::NAME,
            Arc::clone(&self.aggregate),
        ));
        self
    }

    pub(crate) fn into_entries(self) -> Vec<HandlerEntry> {
        self.entries
    }
}
