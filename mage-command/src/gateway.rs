//! 命令网关（CommandGateway）
//!
//! 应用代码提交命令的唯一入口：
//! - `submit`：即发即忘，命令入队即返回；
//! - `submit_and_wait`：请求/响应，返回 [`CommandCallback`]，由调用方决定何时等待结果。
//!
//! 网关本身无状态，可自由克隆并在任务间共享。
//!
use crate::callback::CommandCallback;
use crate::command::Command;
use crate::command_bus::CommandBus;
use crate::config::CommandConfig;
use crate::error::CommandError;
use crate::persist::CommandSourceRepository;
use crate::registry::HandlerRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandGateway {
    bus: Arc<CommandBus>,
}

impl CommandGateway {
    pub fn new(bus: Arc<CommandBus>) -> Self {
        Self { bus }
    }

    /// 以配置、注册表与审计存储一次性装配网关
    pub fn start(
        config: &CommandConfig,
        registry: HandlerRegistry,
        repository: Arc<dyn CommandSourceRepository>,
    ) -> Result<Self, CommandError> {
        let bus = CommandBus::new(config, Arc::new(registry), repository)?;
        tracing::info!(
            source = bus.source(),
            core_pool_size = config.core_pool_size,
            max_pool_size = config.max_pool_size,
            queue_capacity = config.queue_capacity,
            "command gateway started"
        );
        Ok(Self::new(Arc::new(bus)))
    }

    pub fn bus(&self) -> &Arc<CommandBus> {
        &self.bus
    }

    /// 即发即忘提交；只有入队失败（池已关闭或饱和拒绝）会返回错误
    pub async fn submit<C: Command>(&self, command: C) -> Result<(), CommandError> {
        tracing::debug!(command = C::NAME, "submit");
        self.bus.dispatch(command).await
    }

    /// 请求/响应提交；处理器结果按 `T` 还原并通过句柄交付
    pub async fn submit_and_wait<C, T>(&self, command: C) -> Result<CommandCallback<T>, CommandError>
    where
        C: Command,
        T: Send + 'static,
    {
        tracing::debug!(command = C::NAME, "submit and wait");
        self.bus.dispatch_and_wait(command).await
    }

    /// 停止接收新命令并等待常驻 worker 退出
    pub async fn shutdown(&self) {
        self.bus.shutdown();
        self.bus.join().await;
        tracing::info!(source = self.bus.source(), "command gateway stopped");
    }
}
