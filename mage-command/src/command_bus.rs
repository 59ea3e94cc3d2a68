//! 命令总线（CommandBus）
//!
//! 每次分发在工作池的一个任务内完成，两种投递模式共享同一流程：
//! 1. 生成审计主键 `{source, bucket, created_on}`；
//! 2. 序列化命令并写入“待处理”审计记录（先于解析与调用完成）；
//! 3. 按命令的具体类型解析处理器，找不到即视为处理失败；
//! 4. 在当前任务内调用处理器；
//! 5. 按原主键更新审计记录为 `processed` 或 `failed`；
//! 6. 即发即忘模式仅记录日志，请求/响应模式完成结果句柄。
//!
//! 总线从不重试；处理器的错误或 panic 只影响本次分发。
//!
use crate::callback::CommandCallback;
use crate::command::Command;
use crate::command_source::{CommandSource, CommandSourceKey, SourceClock};
use crate::config::CommandConfig;
use crate::error::CommandError;
use crate::persist::CommandSourceRepository;
use crate::registry::{HandlerOutput, HandlerRegistry, panic_message};
use crate::worker_pool::WorkerPool;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub struct CommandBus {
    source: String,
    registry: Arc<HandlerRegistry>,
    repository: Arc<dyn CommandSourceRepository>,
    clock: SourceClock,
    pool: WorkerPool,
}

impl CommandBus {
    /// 创建总线并启动工作池（须在 Tokio 运行时内调用）
    pub fn new(
        config: &CommandConfig,
        registry: Arc<HandlerRegistry>,
        repository: Arc<dyn CommandSourceRepository>,
    ) -> Result<Self, CommandError> {
        config.validate()?;

        let pool = WorkerPool::start(
            config.core_pool_size,
            config.max_pool_size,
            config.queue_capacity,
            config.saturation_policy,
        )?;

        Ok(Self {
            source: config.source.clone(),
            registry,
            repository,
            clock: SourceClock::new(),
            pool,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// 即发即忘：入队即返回，失败只体现在审计记录与日志中
    pub async fn dispatch<C: Command>(self: &Arc<Self>, command: C) -> Result<(), CommandError> {
        tracing::debug!(command = C::NAME, "dispatch (fire-and-forget)");
        let bus = Arc::clone(self);

        self.pool
            .execute(
                C::NAME,
                Box::pin(async move {
                    if let Err(err) = bus.process(command, |_| Ok(())).await {
                        tracing::error!(command = C::NAME, error = %err, "command processing failed");
                    }
                }),
            )
            .await
    }

    /// 请求/响应：入队后返回结果句柄，处理器结果按 `T` 还原
    pub async fn dispatch_and_wait<C, T>(
        self: &Arc<Self>,
        command: C,
    ) -> Result<CommandCallback<T>, CommandError>
    where
        C: Command,
        T: Send + 'static,
    {
        tracing::debug!(command = C::NAME, "dispatch (request/response)");
        let bus = Arc::clone(self);
        let (completion, callback) = CommandCallback::<T>::channel();

        self.pool
            .execute(
                C::NAME,
                Box::pin(async move {
                    let outcome = bus.process(command, HandlerOutput::downcast::<T>).await;
                    if let Err(err) = &outcome {
                        tracing::error!(command = C::NAME, error = %err, "command processing failed");
                    }
                    // 调用方可能已放弃句柄
                    let _ = completion.send(outcome);
                }),
            )
            .await?;

        Ok(callback)
    }

    /// 单次分发的完整流程；`finish` 在审计更新之前把处理器结果转换为调用方需要的形态，
    /// 转换失败与处理器失败同等记录。
    async fn process<C, T, F>(&self, command: C, finish: F) -> Result<T, CommandError>
    where
        C: Command,
        F: FnOnce(HandlerOutput) -> Result<T, CommandError>,
    {
        let key = self.clock.next_key(&self.source);
        let serialized = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            serde_json::to_string(&command)
        })) {
            Ok(serialized) => serialized.map_err(CommandError::from),
            Err(payload) => Err(CommandError::Serialization {
                reason: panic_message(payload.as_ref()),
            }),
        };

        self.store_command(&key, serialized.as_deref().unwrap_or_default())
            .await?;

        // 待处理记录写入之后的任何 panic 都须落到 failed 终态
        let outcome = match serialized {
            Ok(_) => AssertUnwindSafe(async move { self.invoke(command).await.and_then(finish) })
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(CommandError::HandlerInvocation {
                        message: panic_message(payload.as_ref()),
                        cause: None,
                    })
                }),
            Err(err) => Err(err),
        };

        let updated = self
            .update_command_source(&key, outcome.as_ref().err())
            .await;

        // 成功路径上审计更新失败即为本次结果；失败路径上保留处理器的错误
        match (updated, outcome) {
            (Ok(()), outcome) => outcome,
            (Err(update_err), Ok(_)) => Err(update_err),
            (Err(update_err), Err(err)) => {
                tracing::error!(
                    command = C::NAME,
                    key = %key,
                    error = %update_err,
                    "could not record command failure"
                );
                Err(err)
            }
        }
    }

    async fn store_command(&self, key: &CommandSourceKey, payload: &str) -> Result<(), CommandError> {
        tracing::debug!(
            source = key.source(),
            bucket = key.bucket(),
            "storing command source"
        );
        self.repository
            .save(CommandSource::pending(key.clone(), payload))
            .await
    }

    async fn invoke<C: Command>(&self, command: C) -> Result<HandlerOutput, CommandError> {
        let binding = self.registry.resolve::<C>()?;
        tracing::debug!(command = C::NAME, owner = binding.owner(), "invoking command handler");
        binding.invoke(command).await
    }

    async fn update_command_source(
        &self,
        key: &CommandSourceKey,
        failure: Option<&CommandError>,
    ) -> Result<(), CommandError> {
        tracing::debug!(key = %key, failed = failure.is_some(), "updating command source");

        let mut record = self
            .repository
            .find_one(key)
            .await?
            .ok_or_else(|| CommandError::repository(format!("command source not found: {key}")))?;

        let message = failure.map(|err| err.to_string());
        record.complete(message.as_deref())?;

        self.repository.save(record).await
    }

    /// 停止接收新命令
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// 等待常驻 worker 退出
    pub async fn join(&self) {
        self.pool.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_source::CommandStatus;
    use crate::command_handler::CommandHandler;
    use crate::error::HandlerResult;
    use crate::persist::InMemoryCommandSourceRepository;
    use async_trait::async_trait;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Serialize)]
    struct Echo(u32);

    impl Command for Echo {
        const NAME: &'static str = "Echo";
    }

    /// 处理时检查待处理记录是否已写入
    struct Observer {
        repo: Arc<InMemoryCommandSourceRepository>,
        pending_seen: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler<Echo> for Observer {
        type Output = u32;

        async fn handle(&self, cmd: Echo) -> HandlerResult<u32> {
            let pending = self
                .repo
                .all()
                .iter()
                .filter(|r| r.status() == CommandStatus::Pending)
                .count();
            self.pending_seen.fetch_add(pending, Ordering::SeqCst);
            Ok(cmd.0)
        }
    }

    /// 写入失败的审计存储
    struct BrokenStore;

    #[async_trait]
    impl CommandSourceRepository for BrokenStore {
        async fn save(&self, _record: CommandSource) -> Result<(), CommandError> {
            Err(CommandError::repository("store offline"))
        }

        async fn find_one(
            &self,
            _key: &CommandSourceKey,
        ) -> Result<Option<CommandSource>, CommandError> {
            Ok(None)
        }
    }

    fn small_config() -> CommandConfig {
        CommandConfig::builder()
            .core_pool_size(2)
            .max_pool_size(4)
            .queue_capacity(4)
            .build()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pending_record_precedes_invocation() {
        let repo = Arc::new(InMemoryCommandSourceRepository::new());
        let observer = Arc::new(Observer {
            repo: repo.clone(),
            pending_seen: AtomicUsize::new(0),
        });
        let registry = Arc::new(
            HandlerRegistry::builder()
                .handler::<Echo, _>(observer.clone())
                .unwrap()
                .build(),
        );
        let bus = Arc::new(CommandBus::new(&small_config(), registry, repo.clone()).unwrap());

        let value = bus
            .dispatch_and_wait::<_, u32>(Echo(9))
            .await
            .unwrap()
            .get()
            .await
            .unwrap();

        assert_eq!(value, 9);
        assert_eq!(observer.pending_seen.load(Ordering::SeqCst), 1);

        let records = repo.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), CommandStatus::Processed);
        assert_eq!(records[0].command(), "9");
        assert_eq!(records[0].key().source(), "mage-command-v1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn type_mismatch_is_recorded_as_failure() {
        let repo = Arc::new(InMemoryCommandSourceRepository::new());
        let registry = Arc::new(
            HandlerRegistry::builder()
                .handler::<Echo, _>(Arc::new(Observer {
                    repo: repo.clone(),
                    pending_seen: AtomicUsize::new(0),
                }))
                .unwrap()
                .build(),
        );
        let bus = Arc::new(CommandBus::new(&small_config(), registry, repo.clone()).unwrap());

        let failure = bus
            .dispatch_and_wait::<_, String>(Echo(1))
            .await
            .unwrap()
            .get()
            .await
            .unwrap_err();

        assert!(matches!(failure.cause(), CommandError::TypeMismatch { .. }));
        let records = repo.all();
        assert_eq!(records[0].status(), CommandStatus::Failed);
        assert_eq!(records[0].failure_message(), Some(failure.message()));
    }

    /// 以元组为键的映射无法序列化为 JSON
    #[derive(Debug, Serialize)]
    struct Tally(std::collections::HashMap<(u8, u8), u32>);

    impl Command for Tally {
        const NAME: &'static str = "Tally";
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unserializable_command_is_recorded_with_empty_payload() {
        let repo = Arc::new(InMemoryCommandSourceRepository::new());
        let registry = Arc::new(HandlerRegistry::builder().build());
        let bus = Arc::new(CommandBus::new(&small_config(), registry, repo.clone()).unwrap());

        let failure = bus
            .dispatch_and_wait::<_, ()>(Tally([((1, 2), 3)].into_iter().collect()))
            .await
            .unwrap()
            .get()
            .await
            .unwrap_err();

        assert!(matches!(failure.cause(), CommandError::Serialization { .. }));
        assert!(!bus.registry().is_cached::<Tally>());

        let records = repo.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].command(), "");
        assert_eq!(records[0].status(), CommandStatus::Failed);
        assert_eq!(records[0].failure_message(), Some(failure.message()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pending_write_failure_skips_invocation() {
        let repo = Arc::new(InMemoryCommandSourceRepository::new());
        let observer = Arc::new(Observer {
            repo,
            pending_seen: AtomicUsize::new(0),
        });
        let registry = Arc::new(
            HandlerRegistry::builder()
                .handler::<Echo, _>(observer.clone())
                .unwrap()
                .build(),
        );
        let bus = Arc::new(CommandBus::new(&small_config(), registry, Arc::new(BrokenStore)).unwrap());

        let failure = bus
            .dispatch_and_wait::<_, u32>(Echo(1))
            .await
            .unwrap()
            .get()
            .await
            .unwrap_err();

        assert_eq!(failure.message(), "command source repository error: store offline");
        assert!(!bus.registry().is_cached::<Echo>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn keys_are_unique_across_concurrent_dispatches() {
        let repo = Arc::new(InMemoryCommandSourceRepository::new());
        let registry = Arc::new(
            HandlerRegistry::builder()
                .handler::<Echo, _>(Arc::new(Observer {
                    repo: repo.clone(),
                    pending_seen: AtomicUsize::new(0),
                }))
                .unwrap()
                .build(),
        );
        let bus = Arc::new(CommandBus::new(&small_config(), registry, repo.clone()).unwrap());

        for i in 0..50 {
            bus.dispatch(Echo(i)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let records = repo.all();
                if records.len() == 50
                    && records.iter().all(|r| r.status() == CommandStatus::Processed)
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = CommandConfig::builder().queue_capacity(0).build();
        let registry = Arc::new(HandlerRegistry::builder().build());
        let err = CommandBus::new(
            &config,
            registry,
            Arc::new(InMemoryCommandSourceRepository::new()),
        )
        .err()
        .expect("invalid");
        assert!(matches!(err, CommandError::Config { .. }));
    }
}
