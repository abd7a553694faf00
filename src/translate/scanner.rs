//! Balanced-expression scanning over raw query text.
//!
//! Every rewriting step works on text, not on a parse tree, so it needs a
//! shared notion of what is "code" and what is opaque: string literals,
//! comments and bracketed legacy identifiers. The walker in this module
//! is the single place that knows those rules.
//!
//! - `'...'` literals escape a quote by doubling it.
//! - `"..."` literals also accept a backslash escape (`"c\"d"`).
//! - `[...]` is an opaque identifier and ends at the first `]`.
//! - `-- ...` runs to end of line, `/* ... */` to its terminator.

use std::ops::Range;

use crate::util::{is_word_byte, word_at_ci};

/// Skip over an opaque region starting at `i`, returning the index just past
/// it, or `None` when no region starts at `i`.
fn skip_opaque(bytes: &[u8], i: usize, include_brackets: bool) -> Option<usize> {
    match bytes[i] {
        b'\'' | b'"' => {
            let quote = bytes[i];
            let mut j = i + 1;
            while j < bytes.len() {
                if quote == b'"' && bytes[j] == b'\\' {
                    j += 2;
                    continue;
                }
                if bytes[j] == quote {
                    if bytes.get(j + 1) == Some(&quote) {
                        j += 2;
                        continue;
                    }
                    return Some(j + 1);
                }
                j += 1;
            }
            Some(bytes.len())
        }
        b'[' if include_brackets => Some(
            bytes[i..]
                .iter()
                .position(|&b| b == b']')
                .map(|p| i + p + 1)
                .unwrap_or(bytes.len()),
        ),
        b'-' if bytes.get(i + 1) == Some(&b'-') => Some(
            bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| i + p)
                .unwrap_or(bytes.len()),
        ),
        b'/' if bytes.get(i + 1) == Some(&b'*') => Some(
            bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map(|p| i + 2 + p + 2)
                .unwrap_or(bytes.len()),
        ),
        _ => None,
    }
}

/// End of the literal, comment or bracketed name starting at `at`.
pub fn opaque_end(src: &str, at: usize) -> Option<usize> {
    if at >= src.len() {
        return None;
    }
    skip_opaque(src.as_bytes(), at, true)
}

/// Byte ranges of string literals and comments.
pub fn literal_spans(src: &str) -> Vec<Range<usize>> {
    spans(src, false)
}

/// Byte ranges of string literals, comments and bracketed identifiers.
pub fn protected_spans(src: &str) -> Vec<Range<usize>> {
    spans(src, true)
}

fn spans(src: &str, include_brackets: bool) -> Vec<Range<usize>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match skip_opaque(bytes, i, include_brackets) {
            Some(end) => {
                out.push(i..end);
                i = end;
            }
            None => i += 1,
        }
    }
    out
}

/// Whether `pos` falls inside any of `spans`.
pub fn in_spans(spans: &[Range<usize>], pos: usize) -> bool {
    spans.iter().any(|span| span.contains(&pos))
}

/// Find the delimiter closing the `(` or `[` at `open_idx`.
///
/// Returns `None` when `open_idx` is not an opening delimiter or when the
/// text ends before the expression is balanced.
pub fn find_matching_close(src: &str, open_idx: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    match bytes.get(open_idx)? {
        b'[' => bytes[open_idx + 1..]
            .iter()
            .position(|&b| b == b']')
            .map(|p| open_idx + 1 + p),
        b'(' => {
            let mut depth = 0usize;
            let mut i = open_idx;
            while i < bytes.len() {
                if let Some(end) = skip_opaque(bytes, i, true) {
                    i = end;
                    continue;
                }
                match bytes[i] {
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        _ => None,
    }
}

/// Split an argument list (the text between a call's parentheses) on
/// top-level commas. Arguments are trimmed; an empty list yields no
/// arguments.
///
/// # Examples
///
/// ```ignore
/// let args = split_arguments(r#""a,b", g(1,2), "c\"d""#);
/// assert_eq!(args, vec![r#""a,b""#, "g(1,2)", r#""c\"d""#]);
/// ```
pub fn split_arguments(src: &str) -> Vec<String> {
    if src.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut start = 0;
    walk_top_level(src, 0, |i, depth| {
        if depth == 0 && src.as_bytes()[i] == b',' {
            args.push(src[start..i].trim().to_string());
            start = i + 1;
        }
        false
    });
    args.push(src[start..].trim().to_string());
    args
}

/// Visit every code byte from `from` onward with its parenthesis depth
/// (relative to `from`), skipping opaque regions. Stops when `visit`
/// returns true and yields that index.
pub fn walk_top_level(
    src: &str,
    from: usize,
    mut visit: impl FnMut(usize, usize) -> bool,
) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i, true) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' => {
                if visit(i, depth) {
                    return Some(i);
                }
                depth += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                if visit(i, depth) {
                    return Some(i);
                }
            }
            _ => {
                if visit(i, depth) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

/// Offset of the innermost `(` that is still open at `pos`.
pub fn enclosing_open(src: &str, pos: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut stack = Vec::new();
    let mut i = 0;
    while i < pos.min(bytes.len()) {
        if let Some(end) = skip_opaque(bytes, i, true) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' => stack.push(i),
            b')' => {
                stack.pop();
            }
            _ => {}
        }
        i += 1;
    }
    stack.pop()
}

/// End of the parenthesized scope containing `from`: the offset of the
/// `)` that closes it, or the text length at top level.
pub fn scope_end(src: &str, from: usize) -> usize {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i, true) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' if depth == 0 => return i,
            b')' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Length of a (possibly multi-word) keyword such as `GROUP BY` matched at
/// `at`, allowing any whitespace between the words.
pub fn keyword_len_at(src: &str, at: usize, keyword: &str) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut pos = at;
    for (n, word) in keyword.split_whitespace().enumerate() {
        if n > 0 {
            let ws = bytes[pos..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if ws == 0 {
                return None;
            }
            pos += ws;
        }
        if !word_at_ci(src, pos, word) {
            return None;
        }
        pos += word.len();
    }
    Some(pos - at)
}

/// First occurrence of any of `keywords` at parenthesis depth zero, outside
/// literals, comments and bracketed names. Returns the byte offset.
pub fn find_top_level_keyword(src: &str, from: usize, keywords: &[&str]) -> Option<usize> {
    find_top_level_keyword_match(src, from, keywords).map(|(pos, _)| pos)
}

/// Like [`find_top_level_keyword`], also returning which keyword matched.
pub fn find_top_level_keyword_match<'k>(
    src: &str,
    from: usize,
    keywords: &[&'k str],
) -> Option<(usize, &'k str)> {
    let bytes = src.as_bytes();
    let mut found = None;
    walk_top_level(src, from, |i, depth| {
        if depth != 0 || (i > 0 && is_word_byte(bytes[i - 1])) {
            return false;
        }
        for keyword in keywords {
            if keyword_len_at(src, i, keyword).is_some() {
                found = Some((i, *keyword));
                return true;
            }
        }
        false
    });
    found
}
