//! 有界工作池（WorkerPool）
//!
//! 执行模型：
//! - `core_pool_size` 个常驻 worker 从容量为 `queue_capacity` 的有界队列中取任务执行；
//! - 队列已满时，最多再派生 `max_pool_size - core_pool_size` 个溢出任务，各执行一个任务后退出；
//! - 二者皆饱和时按 [`SaturationPolicy`] 处理：`Block` 让提交方等待队列空位，
//!   `Reject` 立即返回 `CommandError::Rejected`。
//!
//! 必须在 Tokio 运行时内启动。
//!
use crate::error::CommandError;
use crate::registry::panic_message;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 池内执行的任务
pub type Job = BoxFuture<'static, ()>;

/// 饱和策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaturationPolicy {
    /// 提交方等待队列空位
    #[default]
    Block,
    /// 立即拒绝
    Reject,
}

impl FromStr for SaturationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown saturation policy '{other}', expected block | reject")),
        }
    }
}

pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    overflow: Arc<Semaphore>,
    policy: SaturationPolicy,
    handle: Handle,
    token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn start(
        core_pool_size: usize,
        max_pool_size: usize,
        queue_capacity: usize,
        policy: SaturationPolicy,
    ) -> Result<Self, CommandError> {
        let handle = Handle::try_current().map_err(|e| CommandError::Runtime {
            reason: e.to_string(),
        })?;

        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let token = CancellationToken::new();

        let workers = (0..core_pool_size.max(1))
            .map(|_| handle.spawn(Self::worker_loop(receiver.clone(), token.clone())))
            .collect();

        Ok(Self {
            sender,
            overflow: Arc::new(Semaphore::new(max_pool_size.saturating_sub(core_pool_size))),
            policy,
            handle,
            token,
            workers: Mutex::new(workers),
        })
    }

    async fn worker_loop(receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>>, token: CancellationToken) {
        loop {
            let job = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                job = async { receiver.lock().await.recv().await } => job,
            };

            match job {
                Some(job) => Self::run(job).await,
                None => break,
            }
        }
    }

    /// 任务内的 panic 止于此处，worker 继续取下一个任务
    async fn run(job: Job) {
        if let Err(payload) = AssertUnwindSafe(job).catch_unwind().await {
            tracing::error!(panic = %panic_message(payload.as_ref()), "worker pool job panicked");
        }
    }

    /// 提交任务；`command` 仅用于拒绝时的错误信息
    pub async fn execute(&self, command: &'static str, job: Job) -> Result<(), CommandError> {
        if self.token.is_cancelled() {
            return Err(CommandError::PoolShutdown);
        }

        let job = match self.sender.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(CommandError::PoolShutdown),
            Err(TrySendError::Full(job)) => job,
        };

        if let Ok(permit) = Arc::clone(&self.overflow).try_acquire_owned() {
            tracing::debug!(command, "queue full, spawning overflow worker");
            self.handle.spawn(async move {
                Self::run(job).await;
                drop(permit);
            });
            return Ok(());
        }

        match self.policy {
            SaturationPolicy::Reject => {
                tracing::warn!(command, "worker pool saturated, rejecting command");
                Err(CommandError::Rejected {
                    command,
                    reason: "worker pool saturated".to_string(),
                })
            }
            SaturationPolicy::Block => {
                tracing::debug!(command, "worker pool saturated, waiting for queue space");
                self.sender
                    .send(job)
                    .await
                    .map_err(|_| CommandError::PoolShutdown)
            }
        }
    }

    /// 空闲溢出名额
    pub fn available_overflow(&self) -> usize {
        self.overflow.available_permits()
    }

    /// 停止接收新任务，常驻 worker 在当前任务结束后退出
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待常驻 worker 退出（需先调用 `shutdown`）
    pub async fn join(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for w in workers {
            let _ = w.await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Notify, oneshot};

    fn gated_job(gate: Arc<Notify>, started: Arc<AtomicUsize>) -> Job {
        Box::pin(async move {
            started.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        })
    }

    async fn explode() {
        panic!("job exploded")
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Reject".parse::<SaturationPolicy>(), Ok(SaturationPolicy::Reject));
        assert_eq!("block".parse::<SaturationPolicy>(), Ok(SaturationPolicy::Block));
        assert!("drop".parse::<SaturationPolicy>().is_err());
    }

    #[test]
    fn start_requires_runtime() {
        let err = WorkerPool::start(1, 1, 1, SaturationPolicy::Block)
            .err()
            .expect("no runtime");
        assert!(matches!(err, CommandError::Runtime { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn executes_jobs() {
        let pool = WorkerPool::start(2, 4, 4, SaturationPolicy::Block).unwrap();
        let (tx, rx) = oneshot::channel();
        pool.execute(
            "Ping",
            Box::pin(async move {
                let _ = tx.send(42);
            }),
        )
        .await
        .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_job_does_not_kill_worker() {
        // 只有一个常驻 worker，且没有溢出名额
        let pool = WorkerPool::start(1, 1, 1, SaturationPolicy::Block).unwrap();
        pool.execute("Boom", Box::pin(explode())).await.unwrap();

        let (tx, rx) = oneshot::channel();
        pool.execute(
            "Ping",
            Box::pin(async move {
                let _ = tx.send("pong");
            }),
        )
        .await
        .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap();
        assert_eq!(reply.unwrap(), "pong");
        assert!(!pool.is_shutdown());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reject_policy_reports_saturation() {
        // 1 个常驻 worker + 1 个队列位 + 1 个溢出名额
        let pool = WorkerPool::start(1, 2, 1, SaturationPolicy::Reject).unwrap();
        let gate = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));

        pool.execute("Slow", gated_job(gate.clone(), started.clone()))
            .await
            .unwrap();
        // 等常驻 worker 取走第一个任务
        tokio::time::timeout(Duration::from_secs(2), async {
            while started.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        pool.execute("Slow", gated_job(gate.clone(), started.clone()))
            .await
            .unwrap(); // 入队
        pool.execute("Slow", gated_job(gate.clone(), started.clone()))
            .await
            .unwrap(); // 溢出
        assert_eq!(pool.available_overflow(), 0);

        let err = pool
            .execute("Slow", gated_job(gate.clone(), started.clone()))
            .await
            .unwrap_err();
        match err {
            CommandError::Rejected { command, .. } => assert_eq!(command, "Slow"),
            other => panic!("unexpected error: {other:?}"),
        }

        gate.notify_waiters();
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn block_policy_waits_for_queue_space() {
        let pool = Arc::new(WorkerPool::start(1, 1, 1, SaturationPolicy::Block).unwrap());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let done = Arc::new(AtomicUsize::new(0));

        pool.execute(
            "Slow",
            Box::pin(async move {
                let _ = release_rx.await;
            }),
        )
        .await
        .unwrap();

        // 第二个任务占满队列
        {
            let done = done.clone();
            pool.execute(
                "Quick",
                Box::pin(async move {
                    done.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();
        }

        // 第三个任务应阻塞直到队列出现空位
        let blocked = {
            let pool = pool.clone();
            let done = done.clone();
            tokio::spawn(async move {
                pool.execute(
                    "Quick",
                    Box::pin(async move {
                        done.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        release_tx.send(()).unwrap();
        blocked.await.unwrap().unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while done.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejects_after_shutdown() {
        let pool = WorkerPool::start(2, 2, 2, SaturationPolicy::Block).unwrap();
        assert!(!pool.is_shutdown());
        pool.shutdown();
        pool.join().await;
        assert!(pool.is_shutdown());

        let err = pool.execute("Late", Box::pin(async {})).await.unwrap_err();
        assert!(matches!(err, CommandError::PoolShutdown));
    }
}
