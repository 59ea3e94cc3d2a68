use mage_command::Command;
use serde::Serialize;

#[derive(Serialize, Command)]
struct OpenAccount {
    owner: String,
}

fn main() {
    assert_eq!(OpenAccount::NAME, "OpenAccount");
    assert!(OpenAccount::ancestry().is_empty());
}
