//! Text hygiene for values crossing the engine boundary.

/// Default cap for failure details and other engine-provided text.
pub const MAX_DETAIL_CHARS: usize = 1000;

/// Typographic single quotes that PowerShell treats like `'`.
const SMART_QUOTES: [char; 4] = ['\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Renders `value` as a single-quoted PowerShell string literal.
///
/// Every quote character that could close the literal is doubled, so the
/// engine always sees exactly one argument.
///
/// # Examples
///
/// ```rust
/// use defenderbridge::validation::quote_literal;
///
/// assert_eq!(quote_literal("C:\\a'b"), "'C:\\a''b'");
/// assert_eq!(quote_literal("x\u{2019}y"), "'x\u{2019}\u{2019}y'");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || SMART_QUOTES.contains(&c) {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Cleans engine text for display.
///
/// Control characters (line breaks included) become spaces, whitespace runs
/// collapse, and the result is trimmed and capped at `max_chars` characters.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars));
    let mut count = 0;
    let mut pending_space = false;

    for c in input.chars() {
        if c.is_control() || c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            if count + 1 >= max_chars {
                break;
            }
            out.push(' ');
            count += 1;
            pending_space = false;
        }
        if count >= max_chars {
            break;
        }
        out.push(c);
        count += 1;
    }

    out
}
