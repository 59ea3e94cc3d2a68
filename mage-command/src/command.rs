use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// 类型擦除后的命令实例
pub type AnyCommand = Box<dyn Any + Send>;

/// 应用层命令（Command）
///
/// 表达“意图”的写操作请求，由命令总线按其运行时类型路由到唯一的处理器。
/// - 总线只关心命令的类型标识与序列化形态（用于审计），不检查字段；
/// - `NAME`：命令的稳定名称，用于日志与错误信息，避免依赖 `type_name::<T>()`；
/// - `ancestry`：该命令可被视作的更通用命令类型（由近及远），
///   为某个“父类型”声明的处理器可以接收其任意“子类型”命令。
///
/// 通常通过 `#[derive(Command)]` 实现：
/// ```rust
/// use mage_command::Command;
/// use serde::Serialize;
///
/// #[derive(Serialize, Command)]
/// struct LedgerCommand { account: String }
///
/// #[derive(Serialize, Command)]
/// #[command(name = "CloseAccount", extends(LedgerCommand))]
/// struct CloseAccount { account: String }
///
/// impl From<CloseAccount> for LedgerCommand {
///     fn from(c: CloseAccount) -> Self { Self { account: c.account } }
/// }
///
/// assert_eq!(<CloseAccount as mage_command::command::Command>::NAME, "CloseAccount");
/// ```
pub trait Command: Serialize + Send + 'static {
    /// 命令的稳定名称（建议常量字符串，不随重构变化）
    const NAME: &'static str;

    /// 可被视作的父类型列表，默认为空
    fn ancestry() -> Ancestry<Self>
    where
        Self: Sized,
    {
        Ancestry::new()
    }
}

/// 命令类型标识：`TypeId` 负责路由，`name` 负责诊断
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandType {
    id: TypeId,
    name: &'static str,
}

impl CommandType {
    pub fn of<C: Command>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: C::NAME,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 到某个父类型的转换（已类型擦除）
#[derive(Clone, Copy, Debug)]
pub struct Upcast {
    target: CommandType,
    apply: fn(AnyCommand) -> AnyCommand,
}

impl Upcast {
    pub fn target(&self) -> CommandType {
        self.target
    }

    /// 将子类型命令转换为父类型命令；实例类型不符时原样返回
    pub fn apply(&self, command: AnyCommand) -> AnyCommand {
        (self.apply)(command)
    }
}

fn upcast<C, B>(command: AnyCommand) -> AnyCommand
where
    C: Command,
    B: Command + From<C>,
{
    match command.downcast::<C>() {
        Ok(c) => Box::new(B::from(*c)),
        Err(other) => other,
    }
}

/// 命令 `C` 的父类型链（由近及远）
pub struct Ancestry<C> {
    upcasts: Vec<Upcast>,
    _marker: PhantomData<fn(C)>,
}

impl<C> Default for Ancestry<C> {
    fn default() -> Self {
        Self {
            upcasts: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<C: Command> Ancestry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个父类型 `B`，要求 `B: From<C>`
    pub fn extends<B>(mut self) -> Self
    where
        B: Command + From<C>,
    {
        self.upcasts.push(Upcast {
            target: CommandType::of::<B>(),
            apply: upcast::<C, B>,
        });
        self
    }

    pub fn upcasts(&self) -> &[Upcast] {
        &self.upcasts
    }

    pub fn is_empty(&self) -> bool {
        self.upcasts.is_empty()
    }
}
