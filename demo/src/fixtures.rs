use crate::repository::JournalEntry;

pub fn sample_journal_entry() -> JournalEntry {
    JournalEntry {
        journal_entry_key: None,
        debtor: "08154711".to_string(),
        creditor: "08154712".to_string(),
        currency_code: "UGX".to_string(),
        amount: 100.00,
    }
}
