use anyhow::Result as AnyResult;
use demo::JournalApp;
use demo::domain::{CreateJournalEntry, ErroneousJournalCommand};
use demo::fixtures::sample_journal_entry;
use demo::repository::JournalEntryKey;
use mage_command::CommandConfig;
use serde::Serialize;
use std::time::Duration;

/// 未登记处理器的命令
#[derive(Debug, Serialize, mage_command::Command)]
struct UnknownCommand(String);

#[tokio::main]
async fn main() -> AnyResult<()> {
    demo::init_tracing();

    let app = JournalApp::start(&CommandConfig::from_env()?)?;

    // 请求/响应
    let key: JournalEntryKey = app
        .gateway
        .submit_and_wait(CreateJournalEntry {
            journal_entry: sample_journal_entry(),
        })
        .await?
        .await?;
    tracing::info!(
        bucket = key.bucket(),
        exists = app.entries.exists(&key),
        "journal entry created"
    );

    // 即发即忘
    app.gateway
        .submit(CreateJournalEntry {
            journal_entry: sample_journal_entry(),
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    tracing::info!(count = app.entries.count(), "journal entries stored");

    for failing in [
        app.gateway
            .submit_and_wait::<_, ()>(UnknownCommand("unknown command".into()))
            .await?,
        app.gateway
            .submit_and_wait::<_, ()>(ErroneousJournalCommand {
                journal_entry: sample_journal_entry(),
            })
            .await?,
    ] {
        if let Err(failure) = failing.await {
            tracing::warn!(error = %failure, "command failed");
        }
    }

    tracing::info!(
        audited = app.command_sources.len(),
        notified = app.listener.notified(),
        "done"
    );

    app.shutdown().await;
    Ok(())
}
