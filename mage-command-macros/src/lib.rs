mod command;

use proc_macro::TokenStream;

/// 命令派生宏
/// - 为目标类型实现 `::mage_command::command::Command`
/// - `NAME` 默认取类型名，可通过 `#[command(name = "...")]` 覆写
/// - `#[command(extends(A, B))]` 声明父类型（由近及远），要求 `A: From<Self>`、`B: From<Self>`
#[proc_macro_derive(Command, attributes(command))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    command::expand(input)
}
