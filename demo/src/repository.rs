//! 日记账分录及其内存存储
//!
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// 分录主键：`bucket` 为分区（ISO 日期），`created_on` 为聚簇键（倒序）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JournalEntryKey {
    bucket: String,
    created_on: DateTime<Utc>,
}

impl JournalEntryKey {
    pub fn at(created_on: DateTime<Utc>) -> Self {
        Self {
            bucket: created_on.format("%Y-%m-%d").to_string(),
            created_on,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_entry_key: Option<JournalEntryKey>,
    pub debtor: String,
    pub creditor: String,
    pub currency_code: String,
    pub amount: f64,
}

#[derive(Debug, Default)]
pub struct JournalEntryRepository {
    entries: DashMap<JournalEntryKey, JournalEntry>,
}

impl JournalEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按分录自带的主键写入；无主键的分录被忽略并返回 `false`
    pub fn save(&self, entry: JournalEntry) -> bool {
        match entry.journal_entry_key.clone() {
            Some(key) => {
                self.entries.insert(key, entry);
                true
            }
            None => false,
        }
    }

    pub fn exists(&self, key: &JournalEntryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn find(&self, key: &JournalEntryKey) -> Option<JournalEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}
