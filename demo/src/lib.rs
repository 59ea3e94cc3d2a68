//! 日记账示例：以命令网关驱动一个日记账聚合
//!
pub mod domain;
pub mod fixtures;
pub mod repository;

use domain::{JournalEntryAggregate, JournalEventListener};
use mage_command::{
    CommandConfig, CommandError, CommandGateway, HandlerRegistry,
    InMemoryCommandSourceRepository,
};
use repository::JournalEntryRepository;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 装配完成的示例应用
pub struct JournalApp {
    pub gateway: CommandGateway,
    pub entries: Arc<JournalEntryRepository>,
    pub command_sources: Arc<InMemoryCommandSourceRepository>,
    pub listener: Arc<JournalEventListener>,
    listener_task: JoinHandle<()>,
}

impl JournalApp {
    /// 须在 Tokio 运行时内调用
    pub fn start(config: &CommandConfig) -> Result<Self, CommandError> {
        let entries = Arc::new(JournalEntryRepository::new());
        let command_sources = Arc::new(InMemoryCommandSourceRepository::new());
        let (events, receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let listener = Arc::new(JournalEventListener::new(entries.clone()));
        let listener_task = listener.clone().spawn(receiver);

        let registry = HandlerRegistry::builder()
            .aggregate(Arc::new(JournalEntryAggregate::new(entries.clone(), events)))?
            .build();
        let gateway = CommandGateway::start(config, registry, command_sources.clone())?;

        Ok(Self {
            gateway,
            entries,
            command_sources,
            listener,
            listener_task,
        })
    }

    pub async fn shutdown(self) {
        self.gateway.shutdown().await;
        self.listener_task.abort();
    }
}

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("demo=debug,mage_command=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
