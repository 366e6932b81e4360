use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators; commas inside
/// groups stay with their group.
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
/// This function preserves token order and inserts spaces
/// between consecutive identifiers to avoid accidental
/// token merging (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let s = t.to_string();

        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&s);
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// Parses `key = value` attribute arguments.
///
/// Returns the pairs in source order, with the value as source text, or a
/// message describing the first malformed argument.
pub(crate) fn parse_options(input: TokenStream) -> Result<Vec<(String, String)>, String> {
    let mut options = Vec::new();

    for arg in split_args(input) {
        let key = match arg.first() {
            Some(TokenTree::Ident(ident)) => ident.to_string(),
            _ => return Err(format!("expected `key = value`, found `{}`", tokens_to_string(&arg))),
        };

        let has_eq = matches!(arg.get(1), Some(TokenTree::Punct(p)) if p.as_char() == '=');
        if !has_eq || arg.len() < 3 {
            return Err(format!("expected a value for `{key}`"));
        }

        options.push((key, tokens_to_string(&arg[2..])));
    }

    Ok(options)
}

/// Name of the function declared by `tokens`, if any.
pub(crate) fn function_name(tokens: &[TokenTree]) -> Option<String> {
    tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "fn"))
        .and_then(|pos| match tokens.get(pos + 1) {
            Some(TokenTree::Ident(id)) => Some(id.to_string()),
            _ => None,
        })
}

/// Builds a `compile_error!` invocation carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
