use mage_command::Command;
use serde::Serialize;

#[derive(Serialize, Command)]
struct LedgerCommand {
    account: String,
}

#[derive(Serialize, Command)]
#[command(name = "CloseAccount", extends(LedgerCommand))]
struct CloseAccountV2 {
    account: String,
}

impl From<CloseAccountV2> for LedgerCommand {
    fn from(c: CloseAccountV2) -> Self {
        Self { account: c.account }
    }
}

fn main() {
    assert_eq!(CloseAccountV2::NAME, "CloseAccount");
    assert_eq!(CloseAccountV2::ancestry().upcasts().len(), 1);
}
