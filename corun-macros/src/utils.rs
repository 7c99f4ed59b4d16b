use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// Consecutive identifiers are separated by a space to avoid accidental
/// token merging (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// Builds the `SchedulerBuilder` expression for the attribute arguments.
///
/// Recognized arguments are `stack_size = N` and `max_coroutines = N`.
/// Anything else is reported through `Err` as a message for
/// `compile_error!`.
pub(crate) fn builder_expr(attr: TokenStream) -> Result<String, String> {
    let mut builder = String::from("::corun::SchedulerBuilder::new()");

    for arg in split_args(attr) {
        let arg = tokens_to_string(&arg);
        let Some((key, value)) = arg.split_once('=') else {
            return Err(format!("expected `key = value`, found `{arg}`"));
        };

        let key = key.trim();
        let value = value.trim().replace('_', "");

        let Ok(value) = value.parse::<usize>() else {
            return Err(format!("`{key}` expects an integer, found `{value}`"));
        };

        match key {
            "stack_size" | "max_coroutines" => {
                builder.push_str(&format!(".{key}({value})"));
            }
            _ => return Err(format!("unknown argument `{key}`")),
        }
    }

    builder.push_str(".build()");
    Ok(builder)
}

/// Returns `true` if the function signature declares a return type.
///
/// The body runs as a coroutine, which has nowhere to hand a value back.
pub(crate) fn has_return_type(tokens: &[TokenTree]) -> bool {
    let Some(fn_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "fn"))
    else {
        return false;
    };

    let params = tokens[fn_pos..]
        .iter()
        .position(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Parenthesis));

    let Some(params) = params.map(|offset| fn_pos + offset) else {
        return false;
    };

    matches!(tokens.get(params + 1), Some(TokenTree::Punct(p)) if p.as_char() == '-')
}

/// Replaces the body of a function item with a body that runs the
/// original one as the first coroutine of a fresh scheduler.
///
/// Returns `None` if the item has no body.
pub(crate) fn wrap_body(tokens: &mut [TokenTree], builder: &str) -> Option<()> {
    let pos = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))?;

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
            let scheduler = {builder};
            scheduler
                .create(move || {{ {block} }})
                .expect(\"failed to start the main coroutine\");
        }}"
    );

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_block.parse().ok()?));

    Some(())
}

/// Turns an error message into a `compile_error!` invocation.
pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
