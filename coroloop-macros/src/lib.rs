mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Turns a function body into a coroutine running on a fresh event loop.
///
/// The loop is built, started, and the body runs through
/// `coroloop::block_on`. When the body returns, the loop is dropped, which
/// stops and joins its thread.
///
/// Accepted options: `name = "..."`, `stack_size = N`, `max_parked = N`.
///
/// ```rust,ignore
/// #[coroloop::main(name = "server", stack_size = 131072)]
/// fn main() {
///     coroloop::time::sleep(std::time::Duration::from_millis(10));
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    wrap(attr, item, "main", false)
}

/// Same as [`main`](macro@main) for `#[test]` functions.
///
/// The loop is named after the test unless a `name` option is given.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    wrap(attr, item, "test", true)
}

fn wrap(attr: TokenStream, item: TokenStream, default_name: &str, is_test: bool) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let options = match utils::parse_options(attr) {
        Ok(options) => options,
        Err(message) => return utils::compile_error(&message),
    };

    let name = utils::function_name(&tokens).unwrap_or_else(|| default_name.to_owned());
    let mut builder = format!("::coroloop::LoopBuilder::new().name({name:?})");

    for (key, value) in options {
        match key.as_str() {
            "name" | "stack_size" | "max_parked" => {
                builder.push_str(&format!(".{key}({value})"));
            }
            other => {
                return utils::compile_error(&format!("unknown coroloop option `{other}`"));
            }
        }
    }

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error("expected a function body");
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
            let __coroloop_loop = {builder}
                .build()
                .unwrap_or_else(|err| ::core::panic!(\"failed to build the event loop: {{err}}\"));

            if let ::core::result::Result::Err(err) = __coroloop_loop.start() {{
                ::core::panic!(\"failed to start the event loop: {{err}}\");
            }}

            match ::coroloop::coroutine::block_on(&__coroloop_loop, move || {{ {block} }}) {{
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(err) => {{
                    ::core::panic!(\"coroutine did not complete: {{err}}\")
                }}
            }}
        }}"
    );

    let stream = match new_block.parse::<TokenStream>() {
        Ok(stream) => stream,
        Err(err) => return utils::compile_error(&format!("coroloop macro error: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));

    if !is_test {
        return tokens.into_iter().collect();
    }

    let mut result: Vec<TokenTree> = match "#[test]".parse::<TokenStream>() {
        Ok(attr) => attr.into_iter().collect(),
        Err(err) => return utils::compile_error(&format!("coroloop macro error: {err}")),
    };
    result.extend(tokens);

    result.into_iter().collect()
}
