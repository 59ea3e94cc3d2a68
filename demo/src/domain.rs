//! 日记账领域：命令、聚合与事件
//!
//! 聚合在创建分录后通过进程内的 `broadcast` 通道发布事件，
//! 事件携带 `operation` 属性（如 `journal-entry-created`）与 JSON 负载。
//! 命令总线既不产生也不依赖这些事件。
//!
use crate::repository::{JournalEntry, JournalEntryKey, JournalEntryRepository};
use async_trait::async_trait;
use chrono::Utc;
use mage_command::{Aggregate, Command, CommandHandler, EntryPoints, HandlerResult};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("{0}")]
    IllegalArgument(String),
    #[error("journal entry not found: {0:?}")]
    EntryNotFound(JournalEntryKey),
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Command)]
#[command(name = "CreateJournalEntryCommand")]
pub struct CreateJournalEntry {
    pub journal_entry: JournalEntry,
}

#[derive(Debug, Clone, Serialize, Command)]
pub struct ErroneousJournalCommand {
    pub journal_entry: JournalEntry,
}

/// 事件属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Created,
}

impl Operation {
    pub const HEADER: &'static str = "operation";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "journal-entry-created",
        }
    }

    pub fn apply(self, payload: String) -> JournalEvent {
        JournalEvent {
            operation: self.as_str(),
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JournalEvent {
    pub operation: &'static str,
    pub payload: String,
}

pub struct JournalEntryAggregate {
    repository: Arc<JournalEntryRepository>,
    events: broadcast::Sender<JournalEvent>,
}

impl JournalEntryAggregate {
    pub fn new(
        repository: Arc<JournalEntryRepository>,
        events: broadcast::Sender<JournalEvent>,
    ) -> Self {
        Self { repository, events }
    }
}

impl Aggregate for JournalEntryAggregate {
    const NAME: &'static str = "JournalEntryAggregate";

    fn entry_points(entry_points: &mut EntryPoints<Self>) {
        entry_points
            .handle::<CreateJournalEntry>()
            .handle::<ErroneousJournalCommand>();
    }
}

#[async_trait]
impl CommandHandler<CreateJournalEntry> for JournalEntryAggregate {
    type Output = JournalEntryKey;

    async fn handle(&self, cmd: CreateJournalEntry) -> HandlerResult<JournalEntryKey> {
        let key = JournalEntryKey::at(Utc::now());

        let mut entry = cmd.journal_entry;
        entry.journal_entry_key = Some(key.clone());
        self.repository.save(entry);

        let payload = serde_json::to_string(&key)?;
        if self.events.send(Operation::Created.apply(payload)).is_err() {
            tracing::debug!(bucket = key.bucket(), "no journal event listener attached");
        }

        Ok(key)
    }
}

#[async_trait]
impl CommandHandler<ErroneousJournalCommand> for JournalEntryAggregate {
    type Output = ();

    async fn handle(&self, _cmd: ErroneousJournalCommand) -> HandlerResult<()> {
        Err(JournalError::IllegalArgument("I'm broken!".to_string()).into())
    }
}

/// 只关注 `journal-entry-created` 事件，校验分录确已落库
pub struct JournalEventListener {
    repository: Arc<JournalEntryRepository>,
    notified: AtomicUsize,
}

impl JournalEventListener {
    pub fn new(repository: Arc<JournalEntryRepository>) -> Self {
        Self {
            repository,
            notified: AtomicUsize::new(0),
        }
    }

    pub fn notify(&self, payload: &str) -> Result<JournalEntryKey, JournalError> {
        let key: JournalEntryKey = serde_json::from_str(payload)?;
        tracing::debug!(bucket = key.bucket(), "journal event listener notified");

        if !self.repository.exists(&key) {
            return Err(JournalError::EntryNotFound(key));
        }

        self.notified.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    pub fn notified(&self) -> usize {
        self.notified.load(Ordering::SeqCst)
    }

    pub fn spawn(
        self: Arc<Self>,
        mut events: broadcast::Receiver<JournalEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.operation == Operation::Created.as_str() => {
                        if let Err(err) = self.notify(&event.payload) {
                            tracing::error!(error = %err, "journal event rejected");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "journal event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
