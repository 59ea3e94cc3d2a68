use async_trait::async_trait;
use mage_command::{
    Aggregate, Command, CommandConfig, CommandGateway, CommandHandler, EntryPoints,
    HandlerRegistry, HandlerResult, InMemoryCommandSourceRepository,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Serialize, Command)]
struct Deposit {
    amount: i64,
}

/// 奖励入账，由 `Deposit` 的处理器接收
#[derive(Debug, Serialize, Command)]
#[command(name = "Bonus", extends(Deposit))]
struct Bonus {
    amount: i64,
}

impl From<Bonus> for Deposit {
    fn from(b: Bonus) -> Self {
        Self { amount: b.amount }
    }
}

#[derive(Debug, Serialize, Command)]
struct Withdraw {
    amount: i64,
}

#[derive(Default)]
struct Account {
    balance: AtomicI64,
}

impl Aggregate for Account {
    const NAME: &'static str = "Account";

    fn entry_points(entry_points: &mut EntryPoints<Self>) {
        entry_points.handle::<Deposit>().handle::<Withdraw>();
    }
}

#[async_trait]
impl CommandHandler<Deposit> for Account {
    type Output = i64;

    async fn handle(&self, cmd: Deposit) -> HandlerResult<i64> {
        Ok(self.balance.fetch_add(cmd.amount, Ordering::SeqCst) + cmd.amount)
    }
}

#[async_trait]
impl CommandHandler<Withdraw> for Account {
    type Output = i64;

    async fn handle(&self, cmd: Withdraw) -> HandlerResult<i64> {
        let balance = self.balance.load(Ordering::SeqCst);
        if balance < cmd.amount {
            return Err("insufficient funds".into());
        }
        Ok(self.balance.fetch_sub(cmd.amount, Ordering::SeqCst) - cmd.amount)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let repo = Arc::new(InMemoryCommandSourceRepository::new());
    let registry = HandlerRegistry::builder()
        .aggregate(Arc::new(Account::default()))?
        .build();
    let gateway = CommandGateway::start(&CommandConfig::default(), registry, repo.clone())?;

    let balance: i64 = gateway
        .submit_and_wait(Deposit { amount: 100 })
        .await?
        .await?;
    println!("Deposit: balance={balance}");

    let balance: i64 = gateway.submit_and_wait(Bonus { amount: 5 }).await?.await?;
    println!("Bonus: balance={balance}");

    // 处理器返回错误 -> 处理失败，消息与根因一致
    let callback = gateway
        .submit_and_wait::<_, i64>(Withdraw { amount: 1_000 })
        .await?;
    if let Err(failure) = callback.await {
        println!("Withdraw failed: {}", failure.message());
    }

    gateway.shutdown().await;

    for record in repo.all() {
        println!(
            "{} -> {:?} {}",
            record.key(),
            record.status(),
            record.command()
        );
    }

    Ok(())
}
