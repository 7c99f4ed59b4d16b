mod utils;

use proc_macro::{TokenStream, TokenTree};

/// Runs `main` as the first coroutine of a fresh scheduler.
///
/// Accepts `stack_size = N` and `max_coroutines = N`, forwarded to
/// `SchedulerBuilder`. The function must not declare a return type.
///
/// ```rust,ignore
/// #[corun::main(stack_size = 262144)]
/// fn main() {
///     corun::spawn(|| corun::yield_now().unwrap()).unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let builder = match utils::builder_expr(attr) {
        Ok(builder) => builder,
        Err(msg) => return utils::compile_error(&msg),
    };

    if utils::has_return_type(&tokens) {
        return utils::compile_error("#[corun::main] functions cannot return a value");
    }

    if utils::wrap_body(&mut tokens, &builder).is_none() {
        return utils::compile_error("#[corun::main] expects a function with a body");
    }

    tokens.into_iter().collect()
}

/// Runs a test body as the first coroutine of a fresh scheduler.
///
/// Takes the same arguments as [`main`](macro@main) and adds `#[test]`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let builder = match utils::builder_expr(attr) {
        Ok(builder) => builder,
        Err(msg) => return utils::compile_error(&msg),
    };

    if utils::has_return_type(&tokens) {
        return utils::compile_error("#[corun::test] functions cannot return a value");
    }

    if utils::wrap_body(&mut tokens, &builder).is_none() {
        return utils::compile_error("#[corun::test] expects a function with a body");
    }

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
