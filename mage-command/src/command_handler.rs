use crate::{command::Command, error::HandlerResult};
use async_trait::async_trait;

/// 命令处理入口
///
/// 某个聚合（或独立处理器）对命令 `C` 的处理逻辑，`Output` 为请求/响应模式下
/// 交付给调用方的返回值（无返回值时使用 `()`）。
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    type Output: Send + 'static;

    async fn handle(&self, cmd: C) -> HandlerResult<Self::Output>;
}
