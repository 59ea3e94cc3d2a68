use crate::command_source::{CommandSource, CommandSourceKey};
use crate::error::CommandError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CommandSourceRepository: Send + Sync {
    /// 按主键插入或覆盖
    async fn save(&self, record: CommandSource) -> Result<(), CommandError>;

    async fn find_one(&self, key: &CommandSourceKey)
    -> Result<Option<CommandSource>, CommandError>;
}

#[async_trait]
impl<T> CommandSourceRepository for Arc<T>
where
    T: CommandSourceRepository + ?Sized,
{
    async fn save(&self, record: CommandSource) -> Result<(), CommandError> {
        (**self).save(record).await
    }

    async fn find_one(
        &self,
        key: &CommandSourceKey,
    ) -> Result<Option<CommandSource>, CommandError> {
        (**self).find_one(key).await
    }
}
