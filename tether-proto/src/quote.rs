//! POSIX shell quoting.
//!
//! [`quote`] turns any string into a single shell word that evaluates back
//! to exactly that string, preferring the most readable form that works:
//!
//! | style                     | example output              |
//! |---------------------------|-----------------------------|
//! | [`Style::Bare`]           | `path/to/file.txt`          |
//! | [`Style::SingleQuoted`]   | `'two words'`               |
//! | [`Style::DoubleQuoted`]   | `"it's"`                    |
//! | [`Style::Dithered`]       | `"it's "'$HOME'`            |
//! | [`Style::PrintfEscaped`]  | `` "`printf 'a\012b'`" ``   |

/// Quoting strategy chosen for a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Style {
    /// Only word characters and `.`, `/`, `-`; emitted unchanged.
    Bare,
    /// No `'` and no line break; wrapped in `'…'`.
    SingleQuoted,
    /// Nothing special inside `"…"` (may contain `'`); wrapped in `"…"`.
    DoubleQuoted,
    /// No line break; concatenated `'…'` and `"…"` runs.
    Dithered,
    /// Rebuilt at evaluation time by `printf` with octal escapes.
    PrintfEscaped,
}

/// Returns `true` for characters matched by a regex `\w`.
fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Punctuation with no special meaning inside double quotes.
const DQ_PUNCT: &str = "\t #&()*+,./:;<=>?@[]^|~-";

/// Characters that may appear verbatim inside `"…"`.
fn is_dq_safe(c: char) -> bool {
    is_word(c) || c == '\'' || DQ_PUNCT.contains(c)
}

/// Bytes left unescaped in a `printf` format; everything else becomes `\ooo`.
fn is_printf_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || DQ_PUNCT.as_bytes().contains(&b)
}

/// Returns `true` for `\n` and `\r`.
const fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r')
}

/// Picks the quoting style [`quote`] will use for `token`.
pub fn classify(token: &str) -> Style {
    if !token.is_empty()
        && token
            .chars()
            .all(|c| is_word(c) || matches!(c, '.' | '/' | '-'))
    {
        Style::Bare
    } else if !token.chars().any(|c| c == '\'' || is_line_break(c)) {
        Style::SingleQuoted
    } else if token.chars().all(is_dq_safe) {
        Style::DoubleQuoted
    } else if !token.chars().any(is_line_break) {
        Style::Dithered
    } else {
        Style::PrintfEscaped
    }
}

/// Quotes `token` so a POSIX shell parses it back as the same single word.
///
/// NUL cannot appear in a shell word; it is escaped like any other control
/// byte and silently dropped by the shell at evaluation time.
pub fn quote(token: &str) -> String {
    match classify(token) {
        Style::Bare => token.to_owned(),
        Style::SingleQuoted => format!("'{token}'"),
        Style::DoubleQuoted => format!("\"{token}\""),
        Style::Dithered => dither(token).unwrap_or_else(|| printf_escape(token)),
        Style::PrintfEscaped => printf_escape(token),
    }
}

/// Joins `tokens` into one command line, quoting each one.
///
/// The shell's own field splitting and quote removal turn the result back
/// into exactly `tokens`.
pub fn join<I>(tokens: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns `true` if `name` is `[A-Za-z_][A-Za-z0-9_]*`.
///
/// This is stricter than what most shells accept, and is what environment
/// accessors require before sending anything to the remote side.
pub fn is_valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Splits `token` into maximal single- or double-quotable runs.
///
/// At each position the longer of the two candidate runs is taken (single
/// quotes on a tie). Returns `None` if neither run can make progress, which
/// a line-break-free string never triggers.
fn dither(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len() + 8);
    let mut rest = token;
    while !rest.is_empty() {
        let single = run_len(rest, |c| c != '\'' && !is_line_break(c));
        let double = run_len(rest, is_dq_safe);
        if single == 0 && double == 0 {
            return None;
        }
        if single >= double {
            out.push('\'');
            out.push_str(&rest[..single]);
            out.push('\'');
            rest = &rest[single..];
        } else {
            out.push('"');
            out.push_str(&rest[..double]);
            out.push('"');
            rest = &rest[double..];
        }
    }
    Some(out)
}

/// Byte length of the longest prefix of `s` whose chars satisfy `keep`.
fn run_len(s: &str, keep: impl Fn(char) -> bool) -> usize {
    s.char_indices()
        .find(|&(_, c)| !keep(c))
        .map_or(s.len(), |(i, _)| i)
}

/// Rebuilds `token` with an inline `printf` command substitution.
///
/// Command substitution strips trailing line feeds, so those are appended
/// afterwards as a literal single-quoted segment. A leading `-` is escaped
/// so `printf` never reads the format as an option.
fn printf_escape(token: &str) -> String {
    let body = token.trim_end_matches('\n');
    let tail = &token[body.len()..];

    let mut out = String::with_capacity(token.len() * 2 + 16);
    if !body.is_empty() {
        out.push_str("\"`printf '");
        for (i, &b) in body.as_bytes().iter().enumerate() {
            if is_printf_safe(b) && !(i == 0 && b == b'-') {
                out.push(char::from(b));
            } else {
                out.push_str(&format!("\\{b:03o}"));
            }
        }
        out.push_str("'`\"");
    }
    if !tail.is_empty() {
        out.push('\'');
        out.push_str(tail);
        out.push('\'');
    }
    out
}
