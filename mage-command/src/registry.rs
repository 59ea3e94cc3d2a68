//! 处理器注册表（HandlerRegistry）
//!
//! - 启动时通过 [`RegistryBuilder`] 显式登记聚合与处理器入口；
//! - 运行时按命令的具体类型解析出唯一的 [`HandlerBinding`]，首次解析后按 `TypeId` 缓存；
//! - 解析策略为“最具体者优先”：精确类型的入口优先于父类型入口，
//!   父类型之间按命令声明的 `ancestry` 顺序（由近及远）选取；
//! - 同一精确类型重复登记会在构建期报错，因此解析结果与枚举顺序无关。
//!
use crate::aggregate::{Aggregate, EntryPoints};
use crate::command::{AnyCommand, Command, CommandType, Upcast};
use crate::command_handler::CommandHandler;
use crate::error::CommandError;
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId, type_name};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

type InvokeFn =
    Arc<dyn Fn(AnyCommand) -> BoxFuture<'static, Result<HandlerOutput, CommandError>> + Send + Sync>;

/// 处理器的返回值（类型擦除），在请求/响应模式下按调用方期望的类型还原
pub struct HandlerOutput {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl HandlerOutput {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 还原为调用方期望的类型 `T`，类型不符时返回 `TypeMismatch`
    pub fn downcast<T: 'static>(self) -> Result<T, CommandError> {
        let found = self.type_name();
        self.value
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| CommandError::TypeMismatch {
                expected: type_name::<T>(),
                found,
            })
    }
}

/// 一个处理入口：所属聚合 + 声明接收的命令类型 + 调用闭包
#[derive(Clone)]
pub struct HandlerEntry {
    owner: &'static str,
    accepts: CommandType,
    invoke: InvokeFn,
}

impl HandlerEntry {
    pub fn new<C, H>(owner: &'static str, handler: Arc<H>) -> Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let invoke: InvokeFn = Arc::new(move |boxed_cmd: AnyCommand| {
            let handler = Arc::clone(&handler);

            Box::pin(async move {
                // 注册表保证入参已按 accepts 转换，正常情况下不会失败
                match boxed_cmd.downcast::<C>() {
                    Ok(cmd) => handler
                        .handle(*cmd)
                        .await
                        .map(HandlerOutput::new::<H::Output>)
                        .map_err(CommandError::invocation),
                    Err(_) => Err(CommandError::TypeMismatch {
                        expected: C::NAME,
                        found: "unknown",
                    }),
                }
            }) as BoxFuture<'static, Result<HandlerOutput, CommandError>>
        });

        Self {
            owner,
            accepts: CommandType::of::<C>(),
            invoke,
        }
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn accepts(&self) -> CommandType {
        self.accepts
    }
}

/// 处理入口的枚举来源
///
/// 注册表在缓存未命中时通过它扫描全部入口，枚举顺序须稳定。
pub trait HandlerLookup: Send + Sync {
    fn entry_points(&self) -> &[HandlerEntry];
}

/// 由 [`RegistryBuilder`] 产出的入口表
#[derive(Clone, Default)]
pub struct EntryPointTable {
    entries: Vec<HandlerEntry>,
}

impl HandlerLookup for EntryPointTable {
    fn entry_points(&self) -> &[HandlerEntry] {
        &self.entries
    }
}

/// 注册表构建器
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<HandlerEntry>,
}

impl RegistryBuilder {
    /// 登记一个聚合及其声明的全部入口
    pub fn aggregate<A: Aggregate>(mut self, aggregate: Arc<A>) -> Result<Self, CommandError> {
        let mut entry_points = EntryPoints::new(aggregate);
        A::entry_points(&mut entry_points);

        for entry in entry_points.into_entries() {
            self.push(entry)?;
        }

        Ok(self)
    }

    /// 登记一个独立处理器
    pub fn handler<C, H>(mut self, handler: Arc<H>) -> Result<Self, CommandError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.push(HandlerEntry::new::<C, H>(type_name::<H>(), handler))?;
        Ok(self)
    }

    fn push(&mut self, entry: HandlerEntry) -> Result<(), CommandError> {
        if self.entries.iter().any(|e| e.accepts == entry.accepts) {
            return Err(CommandError::AlreadyRegistered {
                command: entry.accepts.name(),
            });
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn into_lookup(self) -> EntryPointTable {
        EntryPointTable {
            entries: self.entries,
        }
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry::new(Arc::new(self.into_lookup()))
    }
}

/// 已解析的处理器绑定
pub struct HandlerBinding {
    command: CommandType,
    entry: HandlerEntry,
    upcast: Option<Upcast>,
}

impl HandlerBinding {
    pub fn command(&self) -> CommandType {
        self.command
    }

    pub fn owner(&self) -> &'static str {
        self.entry.owner()
    }

    /// 绑定入口声明接收的类型（精确匹配时与 `command` 相同）
    pub fn accepts(&self) -> CommandType {
        self.entry.accepts
    }

    /// 在当前任务内调用处理器；处理器 panic 时解包出 panic 消息作为根因
    pub async fn invoke<C: Command>(&self, cmd: C) -> Result<HandlerOutput, CommandError> {
        let mut boxed: AnyCommand = Box::new(cmd);
        if let Some(upcast) = &self.upcast {
            boxed = upcast.apply(boxed);
        }

        match AssertUnwindSafe((self.entry.invoke)(boxed))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => Err(CommandError::HandlerInvocation {
                message: panic_message(payload.as_ref()),
                cause: None,
            }),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "command handler panicked".to_string()
    }
}

pub struct HandlerRegistry {
    lookup: Arc<dyn HandlerLookup>,
    cache: DashMap<TypeId, Arc<HandlerBinding>>,
}

impl HandlerRegistry {
    pub fn new(lookup: Arc<dyn HandlerLookup>) -> Self {
        Self {
            lookup,
            cache: DashMap::new(),
        }
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// 解析命令 `C` 的处理器绑定
    ///
    /// 并发的首次解析可能重复扫描，但结果一致，以先写入缓存者为准；
    /// 解析失败不写缓存。
    pub fn resolve<C: Command>(&self) -> Result<Arc<HandlerBinding>, CommandError> {
        let key = TypeId::of::<C>();
        if let Some(binding) = self.cache.get(&key).map(|b| Arc::clone(&b)) {
            return Ok(binding);
        }

        let binding = Arc::new(self.scan::<C>()?);
        let cached = self.cache.entry(key).or_insert(binding);

        Ok(Arc::clone(&cached))
    }

    fn scan<C: Command>(&self) -> Result<HandlerBinding, CommandError> {
        let command = CommandType::of::<C>();
        let entries = self.lookup.entry_points();
        tracing::debug!(command = command.name(), "scanning command handlers");

        if let Some(entry) = entries.iter().find(|e| e.accepts == command) {
            return Ok(HandlerBinding {
                command,
                entry: entry.clone(),
                upcast: None,
            });
        }

        for upcast in C::ancestry().upcasts() {
            if let Some(entry) = entries.iter().find(|e| e.accepts == upcast.target()) {
                tracing::debug!(
                    command = command.name(),
                    accepts = upcast.target().name(),
                    "bound command handler via supertype"
                );
                return Ok(HandlerBinding {
                    command,
                    entry: entry.clone(),
                    upcast: Some(*upcast),
                });
            }
        }

        tracing::error!(command = command.name(), "could not find command handler");
        Err(CommandError::HandlerNotFound {
            command: command.name(),
        })
    }

    pub fn is_cached<C: Command>(&self) -> bool {
        self.cache.contains_key(&TypeId::of::<C>())
    }

    /// 已登记入口接收的命令名列表（只读视图）
    pub fn registered_commands(&self) -> Vec<&'static str> {
        self.lookup
            .entry_points()
            .iter()
            .map(|e| e.accepts.name())
            .collect()
    }
}
