//! 请求/响应结果句柄（CommandCallback）
//!
//! 提交时创建、由 worker 任务恰好完成一次；一次分发对应一个句柄，取值后即消耗。
//! 底层为 `tokio::sync::oneshot`，丢弃句柄即放弃结果（分发本身仍会跑完）。
//!
use crate::error::{CommandError, ProcessingFailure};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use tokio::sync::oneshot;

pub(crate) type Completion<T> = oneshot::Sender<Result<T, CommandError>>;

#[must_use = "the outcome is only observable through the callback"]
pub struct CommandCallback<T> {
    receiver: oneshot::Receiver<Result<T, CommandError>>,
}

impl<T: Send + 'static> CommandCallback<T> {
    pub(crate) fn channel() -> (Completion<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { receiver: rx })
    }

    /// 等待分发完成，返回处理器结果或统一的处理失败
    pub async fn get(self) -> Result<T, ProcessingFailure> {
        Self::settle(self.receiver.await)
    }

    /// 在非异步上下文中阻塞等待；不可在 Tokio 运行时的线程内调用
    pub fn blocking_get(self) -> Result<T, ProcessingFailure> {
        Self::settle(self.receiver.blocking_recv())
    }

    fn settle(
        received: Result<Result<T, CommandError>, oneshot::error::RecvError>,
    ) -> Result<T, ProcessingFailure> {
        match received {
            Ok(outcome) => outcome.map_err(ProcessingFailure::from),
            Err(_) => Err(ProcessingFailure::from(CommandError::Dropped)),
        }
    }
}

impl<T: Send + 'static> IntoFuture for CommandCallback<T> {
    type Output = Result<T, ProcessingFailure>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.get())
    }
}
