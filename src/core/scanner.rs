//! Print-call scanner - Predicts console output of a source file without running it
//!
//! Recognized grammar, matched anywhere in the text:
//!
//! ```text
//! CALL WS* "(" WS* Q BODY Q WS* ")"
//! CALL = "console.log" | "print"
//! Q    = "'" | '"' | "`"        (closing quote equals the opening one)
//! BODY = any characters except Q and newline
//! ```
//!
//! `CALL` must not be preceded by an identifier character or `.`, so
//! `fprint(...)` and `obj.print(...)` are ignored. There is no support for
//! escaped quotes, multi-line strings, concatenation or interpolation; the
//! literal text between the quotes is reported as-is.

/// Call names whose first string argument is reported
pub const OUTPUT_CALLS: &[&str] = &["console.log", "print"];

const QUOTES: &[char] = &['\'', '"', '`'];

/// Extract the string literal of every recognized output call, in source order
pub fn scan_output(source: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let next = OUTPUT_CALLS
            .iter()
            .filter_map(|call| rest.find(call).map(|at| (at, *call)))
            .min_by_key(|(at, _)| *at);

        let Some((at, call)) = next else {
            break;
        };

        let start = pos + at;
        if preceded_by_identifier(source, start) {
            pos = start + call.len();
            continue;
        }

        match parse_call_argument(&source[start + call.len()..]) {
            Some((literal, consumed)) => {
                found.push(literal.to_string());
                pos = start + call.len() + consumed;
            }
            None => pos = start + call.len(),
        }
    }

    found
}

fn preceded_by_identifier(source: &str, at: usize) -> bool {
    source[..at]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
}

/// Parse `WS* ( WS* Q BODY Q WS* )` and return the body and consumed length
fn parse_call_argument(input: &str) -> Option<(&str, usize)> {
    let after_ws = skip_whitespace(input, 0);
    if !input[after_ws..].starts_with('(') {
        return None;
    }

    let quote_at = skip_whitespace(input, after_ws + 1);
    let quote = input[quote_at..].chars().next()?;
    if !QUOTES.contains(&quote) {
        return None;
    }

    let body_start = quote_at + quote.len_utf8();
    let body_len = input[body_start..].find(|c: char| c == quote || c == '\n')?;
    let body_end = body_start + body_len;
    if !input[body_end..].starts_with(quote) {
        return None;
    }

    let close_at = skip_whitespace(input, body_end + quote.len_utf8());
    if !input[close_at..].starts_with(')') {
        return None;
    }

    Some((&input[body_start..body_end], close_at + 1))
}

fn skip_whitespace(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(input.len())
}
