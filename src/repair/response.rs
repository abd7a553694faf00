//! Parsing completion replies into DDL statements

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RepairError;
use crate::model::ObjectKind;
use crate::translate::scanner::{in_spans, literal_spans};
use crate::util::leading_keyword;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*```[A-Za-z]*\s*$").expect("valid pattern"));
static STATEMENT_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i);\s*(?:--[^\n]*\n\s*)*(CREATE|DROP|ALTER|COMMENT|GRANT)\b").expect("valid pattern")
});
static DOLLAR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[A-Za-z_]*\$").expect("valid pattern"));

/// Remove markdown code fences.
pub fn strip_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Drop prose lines before the first line that starts SQL.
pub fn strip_preamble(text: &str) -> &str {
    const STARTS: &[&str] = &["CREATE", "DROP", "ALTER", "COMMENT", "GRANT", "SET", "--"];
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let upper = line.trim_start().to_ascii_uppercase();
        if STARTS.iter().any(|s| upper.starts_with(s)) {
            return &text[offset..];
        }
        offset += line.len();
    }
    text
}

/// Byte ranges of `$tag$ ... $tag$` bodies.
fn dollar_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, &str)> = None;
    for m in DOLLAR_TAG.find_iter(text) {
        match open {
            Some((start, tag)) if tag == m.as_str() => {
                spans.push(start..m.end());
                open = None;
            }
            Some(_) => {}
            None => open = Some((m.start(), m.as_str())),
        }
    }
    if let Some((start, _)) = open {
        spans.push(start..text.len());
    }
    spans
}

/// Dollar-quoted bodies, then string literals and comments outside them.
fn opaque_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = dollar_spans(text);
    let mut masked = text.as_bytes().to_vec();
    for span in &spans {
        masked[span.clone()].fill(b' ');
    }
    // blanking whole dollar bodies keeps the text valid UTF-8
    let masked = String::from_utf8_lossy(&masked);
    spans.extend(literal_spans(&masked));
    spans
}

fn is_comment_only(fragment: &str) -> bool {
    fragment
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Split a reply into statements at `;` followed by a DDL keyword.
///
/// Semicolons inside dollar-quoted bodies, string literals and comments
/// never split. Blank and comment-only fragments are dropped.
pub fn split_statements(text: &str) -> Vec<String> {
    let text = strip_fences(text);
    let text = strip_preamble(&text);
    let spans = opaque_spans(text);
    let mut cuts = Vec::new();
    for m in STATEMENT_BREAK.find_iter(text) {
        if !in_spans(&spans, m.start()) {
            cuts.push(m.start() + 1);
        }
    }
    cuts.push(text.len());

    let mut statements = Vec::new();
    let mut start = 0;
    for cut in cuts {
        let fragment = text[start..cut].trim();
        start = cut;
        if is_comment_only(fragment) {
            continue;
        }
        let mut statement = fragment.to_string();
        if !statement.ends_with(';') {
            statement.push(';');
        }
        statements.push(statement);
    }
    statements
}

/// `Function` when any statement creates a function or procedure, else
/// `View`.
pub fn classify(statements: &[String]) -> ObjectKind {
    let creates = |what: &str| {
        statements.iter().any(|s| {
            let upper = s
                .lines()
                .filter(|l| !l.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_uppercase();
            leading_keyword(&upper).as_deref() == Some("CREATE")
                && upper
                    .split_whitespace()
                    .take(6)
                    .any(|word| word == what)
        })
    };
    if creates("FUNCTION") || creates("PROCEDURE") {
        ObjectKind::Function
    } else {
        ObjectKind::View
    }
}

/// Statements from a completion reply; empty replies are an error.
pub fn parse_reply(text: &str) -> Result<Vec<String>, RepairError> {
    let statements = split_statements(text);
    if statements.is_empty() {
        return Err(RepairError::EmptyResponse);
    }
    Ok(statements)
}
