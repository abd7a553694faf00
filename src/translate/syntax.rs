//! Legacy-to-PostgreSQL syntax translation.
//!
//! Steps run in a fixed order:
//!
//! 1. Form/report/session-variable references are resolved.
//! 2. `[bracketed]` names become quoted, sanitized identifiers and legacy
//!    `"strings"` become `'strings'`.
//! 3. Operators and literals are rewritten (`&`, `#dates#`, `Mod`,
//!    `DISTINCTROW`, `LIKE` wildcards, `TOP n`, `DELETE *`).
//! 4. Bare table names and calls to registered functions are
//!    schema-qualified.
//! 5. In cross-join mode, state-store joins are injected.
//!
//! Qualification has to run before join injection: the state table is
//! already qualified and must not pick up a second prefix.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::identifier_utils::{quote_ident, quote_literal, sanitize_identifier};
use super::join_injection::inject_state_joins;
use super::references;
use super::scanner::{
    enclosing_open, find_matching_close, in_spans, literal_spans, opaque_end, scope_end,
};
use crate::config::ConvertOptions;
use crate::ddl::aggregates::{FIRST_AGGREGATE, LAST_AGGREGATE};
use crate::error::ConversionError;
use crate::model::{ControlMapping, Diagnostics, StateReference, StorageLocation};
use crate::util::{is_word_byte, leading_keyword};

static PARAMETERS_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*PARAMETERS\b[^;]*;\s*").expect("valid pattern"));
static CONCAT_OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new("&").expect("valid pattern"));
static DATE_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([^#\r\n]{1,40})#").expect("valid pattern"));
static MOD_OPERATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bmod\b").expect("valid pattern"));
static DISTINCTROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdistinctrow\b").expect("valid pattern"));
static LIKE_OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(not\s+)?a?like\b").expect("valid pattern"));
static DELETE_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bdelete\s+(?:(?:"[^"]*"|\w+)\s*\.\s*)?\*\s*from\b"#).expect("valid pattern")
});
static TOP_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bselect(\s+(?:distinct|all)\b)?\s+top\s+(\d+)(\s+percent\b)?")
        .expect("valid pattern")
});
static TABLE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(from|join|update|into|using)\b").expect("valid pattern"));

/// Words that end a FROM item instead of naming an alias.
const CLAUSE_WORDS: &[&str] = &[
    "WHERE", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "JOIN", "CROSS", "NATURAL", "ON", "GROUP",
    "ORDER", "HAVING", "UNION", "LIMIT", "SET", "USING", "WINDOW", "VALUES", "SELECT", "OFFSET",
    "FETCH", "FOR", "INTERSECT", "EXCEPT", "RETURNING", "IN", "AND", "OR", "WITH", "LATERAL",
    "ONLY",
];

/// Output of [`translate_syntax`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxOutput {
    pub sql: String,
    pub referenced: Vec<StorageLocation>,
}

/// Run every syntax step over function-translated text.
///
/// Passing `state_refs` selects cross-join mode: references become
/// `ssN.value` reads and the matching joins are added at the end. A step
/// that fails leaves its input unchanged and records a warning.
pub fn translate_syntax(
    sql: &str,
    mapping: &ControlMapping,
    options: &ConvertOptions,
    diagnostics: &mut Diagnostics,
    mut state_refs: Option<&mut Vec<StateReference>>,
) -> SyntaxOutput {
    let text = strip_parameters_clause(sql);
    let first_new = state_refs.as_ref().map_or(0, |refs| refs.len());

    let resolved = references::resolve(
        &text,
        mapping,
        options,
        state_refs.as_deref_mut(),
        diagnostics,
    );
    tracing::debug!(referenced = resolved.referenced.len(), "references resolved");

    let mut text = resolved.sql;
    text = run_step("identifier conversion", text, diagnostics, |t, _| {
        convert_delimiters(t)
    });
    text = run_step("operator rewriting", text, diagnostics, rewrite_operators);
    text = run_step("schema qualification", text, diagnostics, |t, _| {
        qualify_names(t, options)
    });

    if let Some(refs) = state_refs {
        if refs.len() > first_new {
            let new_refs = &refs[first_new..];
            text = run_step("state join injection", text, diagnostics, |t, _| {
                inject_state_joins(t, new_refs, options)
            });
        }
    }

    SyntaxOutput {
        sql: text,
        referenced: resolved.referenced,
    }
}

fn run_step(
    stage: &str,
    text: String,
    diagnostics: &mut Diagnostics,
    step: impl FnOnce(&str, &mut Diagnostics) -> Result<String, ConversionError>,
) -> String {
    match step(&text, diagnostics) {
        Ok(out) => out,
        Err(err) => {
            diagnostics.warn(format!("{} skipped: {}", stage, err));
            text
        }
    }
}

/// Remove a leading `PARAMETERS ...;` declaration.
pub fn strip_parameters_clause(sql: &str) -> String {
    PARAMETERS_CLAUSE.replace(sql, "").into_owned()
}

/// Replace every match of `pattern` that starts outside literals, quoted
/// identifiers and comments.
fn replace_outside_literals(
    text: &str,
    pattern: &Regex,
    mut replace: impl FnMut(&Captures) -> String,
) -> String {
    let spans = literal_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in pattern.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if in_spans(&spans, m.start()) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(&replace(&caps));
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Convert `[names]` to quoted identifiers and `"strings"` to
/// single-quoted literals. `[a]![b]` member access becomes `"a"."b"`.
pub fn convert_delimiters(text: &str) -> Result<String, ConversionError> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut last = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                let close = find_matching_close(text, i).ok_or(ConversionError::Unbalanced {
                    delimiter: '[',
                    offset: i,
                })?;
                out.push_str(&text[last..i]);
                out.push_str(&quote_ident(&sanitize_identifier(&text[i + 1..close])));
                i = close + 1;
                if bytes.get(i) == Some(&b'!') && bytes.get(i + 1) == Some(&b'[') {
                    out.push('.');
                    i += 1;
                }
                last = i;
            }
            b'"' => {
                let end = opaque_end(text, i).unwrap_or(bytes.len());
                if end < i + 2 || bytes[end - 1] != b'"' {
                    return Err(ConversionError::Unbalanced {
                        delimiter: '"',
                        offset: i,
                    });
                }
                let content = text[i + 1..end - 1]
                    .replace("\"\"", "\"")
                    .replace("\\\"", "\"");
                out.push_str(&text[last..i]);
                out.push_str(&quote_literal(&content));
                i = end;
                last = i;
            }
            _ => match opaque_end(text, i) {
                Some(end) => i = end,
                None => i += 1,
            },
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Operator, literal and clause rewriting on delimiter-converted text.
pub fn rewrite_operators(text: &str, diagnostics: &mut Diagnostics) -> Result<String, ConversionError> {
    let mut text = text.trim_end().trim_end_matches(';').trim_end().to_string();

    text = replace_outside_literals(&text, &CONCAT_OPERATOR, |_| "||".to_string());
    text = replace_outside_literals(&text, &DATE_LITERAL, |caps| {
        let raw = &caps[1];
        match parse_legacy_datetime(raw) {
            Some(literal) => literal,
            None => {
                diagnostics.warn(format!("Unrecognized date literal #{}# left unchanged", raw));
                caps[0].to_string()
            }
        }
    });
    text = replace_outside_literals(&text, &MOD_OPERATOR, |_| "%".to_string());
    text = replace_outside_literals(&text, &DISTINCTROW, |_| "DISTINCT".to_string());
    text = rewrite_like(&text);
    text = replace_outside_literals(&text, &DELETE_STAR, |_| "DELETE FROM".to_string());
    text = rewrite_top(&text, diagnostics);
    Ok(text)
}

/// Parse the inside of a `#...#` literal into a typed PostgreSQL literal.
pub fn parse_legacy_datetime(raw: &str) -> Option<String> {
    const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d", "%m-%d-%Y", "%d-%b-%Y", "%B %d, %Y"];
    const DATETIME_FORMATS: &[&str] = &[
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M:%S %p",
        "%m/%d/%Y %I:%M %p",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            let date = if date.year() < 100 {
                NaiveDate::parse_from_str(raw, &format.replace("%Y", "%y")).unwrap_or(date)
            } else {
                date
            };
            return Some(format!("DATE '{}'", date.format("%Y-%m-%d")));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S")));
        }
    }
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(raw, format) {
            return Some(format!("TIME '{}'", time.format("%H:%M:%S")));
        }
    }
    None
}

/// `LIKE`/`ALIKE` become `ILIKE`; wildcards in the pattern literals
/// (including concatenated pieces) are translated.
fn rewrite_like(text: &str) -> String {
    let spans = literal_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in LIKE_OPERATOR.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() < last || in_spans(&spans, m.start()) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        if let Some(not) = caps.get(1) {
            out.push_str(not.as_str());
        }
        out.push_str("ILIKE");
        let (operand, end) = convert_like_operand(text, m.end());
        out.push_str(&operand);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

fn skip_ws(text: &str, mut i: usize) -> usize {
    let bytes = text.as_bytes();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn word_end(text: &str, i: usize) -> usize {
    let bytes = text.as_bytes();
    let mut j = i;
    while j < bytes.len() && (is_word_byte(bytes[j]) || bytes[j] == b'.') {
        j += 1;
    }
    j
}

/// Translate the pattern expression following a LIKE keyword, returning
/// the rewritten text and where it ended.
fn convert_like_operand(text: &str, from: usize) -> (String, usize) {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut i = from;
    loop {
        let start = skip_ws(text, i);
        let Some(&b) = bytes.get(start) else { break };
        let end = match b {
            b'\'' => {
                let end = opaque_end(text, start).unwrap_or(bytes.len());
                out.push_str(&text[i..start]);
                out.push_str(&convert_wildcards(&text[start..end]));
                end
            }
            b'"' => {
                let end = opaque_end(text, start).unwrap_or(bytes.len());
                out.push_str(&text[i..end]);
                end
            }
            b'(' => match find_matching_close(text, start) {
                Some(close) => {
                    out.push_str(&text[i..=close]);
                    close + 1
                }
                None => break,
            },
            _ if is_word_byte(b) => {
                let mut end = word_end(text, start);
                let word = text[start..end].to_ascii_uppercase();
                if CLAUSE_WORDS.contains(&word.as_str()) || word == "ESCAPE" || word == "THEN" {
                    break;
                }
                let after = skip_ws(text, end);
                if bytes.get(after) == Some(&b'(') {
                    if let Some(close) = find_matching_close(text, after) {
                        end = close + 1;
                    }
                }
                out.push_str(&text[i..end]);
                end
            }
            _ => break,
        };
        i = end;
        let next = skip_ws(text, i);
        if text[next..].starts_with("||") {
            out.push_str(&text[i..next + 2]);
            i = next + 2;
        } else {
            break;
        }
    }
    (out, i)
}

/// Rewrite one legacy pattern literal (`'...'`) to LIKE syntax.
fn convert_wildcards(literal: &str) -> String {
    let inner = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(literal);
    let mut out = String::with_capacity(literal.len() + 2);
    out.push('\'');
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '[' && i + 2 < chars.len() && chars[i + 2] == ']' && "*?#".contains(chars[i + 1]) {
            out.push(chars[i + 1]);
            i += 3;
            continue;
        }
        match c {
            '*' => out.push('%'),
            '?' | '#' => out.push('_'),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            other => out.push(other),
        }
        i += 1;
    }
    out.push('\'');
    out
}

/// `SELECT TOP n` becomes a trailing `LIMIT n` in the same scope.
fn rewrite_top(text: &str, diagnostics: &mut Diagnostics) -> String {
    let spans = literal_spans(text);
    let matches: Vec<(usize, usize, String, String, bool)> = TOP_CLAUSE
        .captures_iter(text)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            if in_spans(&spans, m.start()) {
                return None;
            }
            Some((
                m.start(),
                m.end(),
                caps.get(1).map_or(String::new(), |d| d.as_str().to_string()),
                caps[2].to_string(),
                caps.get(3).is_some(),
            ))
        })
        .collect();

    let mut text = text.to_string();
    for (start, end, distinct, count, percent) in matches.into_iter().rev() {
        let scope = scope_end(&text, end);
        let body = text[end..scope].trim_end();
        let limit = if percent {
            diagnostics.warn(format!(
                "TOP {} PERCENT has no PostgreSQL equivalent; the row limit was dropped",
                count
            ));
            String::new()
        } else {
            format!(" LIMIT {}", count)
        };
        text = format!(
            "{}SELECT{}{}{}{}",
            &text[..start],
            distinct,
            body,
            limit,
            &text[scope..]
        );
    }
    text
}

/// Schema-qualify bare table names and calls to registered functions.
pub fn qualify_names(text: &str, options: &ConvertOptions) -> Result<String, ConversionError> {
    let spans = literal_spans(text);
    let bytes = text.as_bytes();
    let mut inserts: Vec<usize> = Vec::new();

    for caps in TABLE_KEYWORD.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if in_spans(&spans, m.start()) {
            continue;
        }
        let keyword = m.as_str().to_ascii_uppercase();
        let from_like = keyword == "FROM" || keyword == "JOIN" || keyword == "USING";
        if (keyword == "FROM" || keyword == "JOIN") && !is_table_context(text, m.start()) {
            continue;
        }

        let mut i = m.end();
        loop {
            i = skip_ws(text, i);
            // Grouped joins: FROM ((a INNER JOIN b ...) ...)
            while bytes.get(i) == Some(&b'(') && !starts_select(text, i + 1) {
                i = skip_ws(text, i + 1);
            }
            match bytes.get(i) {
                Some(b'(') => {
                    let close = find_matching_close(text, i).ok_or(ConversionError::Unbalanced {
                        delimiter: '(',
                        offset: i,
                    })?;
                    i = close + 1;
                }
                Some(&b) if b == b'"' || is_word_byte(b) => {
                    let end = name_part_end(text, i);
                    let word = text[i..end].to_ascii_uppercase();
                    if b != b'"' && CLAUSE_WORDS.contains(&word.as_str()) {
                        break;
                    }
                    let qualified = bytes.get(end) == Some(&b'.');
                    let is_call = from_like && bytes.get(skip_ws(text, end)) == Some(&b'(');
                    if !qualified && !is_call {
                        inserts.push(i);
                    }
                    i = end;
                    while bytes.get(i) == Some(&b'.') {
                        i = name_part_end(text, i + 1);
                    }
                }
                _ => break,
            }

            if !(keyword == "FROM" || keyword == "USING") {
                break;
            }
            i = skip_alias(text, i);
            let next = skip_ws(text, i);
            if bytes.get(next) == Some(&b',') {
                i = next + 1;
            } else {
                break;
            }
        }
    }

    let mut out = text.to_string();
    inserts.sort_unstable();
    inserts.dedup();
    for pos in inserts.into_iter().rev() {
        out.insert_str(pos, &format!("{}.", options.schema));
    }
    Ok(qualify_function_calls(&out, options))
}

fn name_part_end(text: &str, i: usize) -> usize {
    let bytes = text.as_bytes();
    if bytes.get(i) == Some(&b'"') {
        return opaque_end(text, i).unwrap_or(bytes.len());
    }
    let mut j = i;
    while j < bytes.len() && is_word_byte(bytes[j]) {
        j += 1;
    }
    j
}

fn skip_alias(text: &str, i: usize) -> usize {
    let bytes = text.as_bytes();
    let mut j = skip_ws(text, i);
    let end = name_part_end(text, j);
    if end > j && text[j..end].eq_ignore_ascii_case("AS") {
        j = skip_ws(text, end);
    }
    let end = name_part_end(text, j);
    if end == j {
        return i;
    }
    let word = text[j..end].to_ascii_uppercase();
    if bytes[j] != b'"' && CLAUSE_WORDS.contains(&word.as_str()) {
        return i;
    }
    end
}

fn starts_select(text: &str, at: usize) -> bool {
    leading_keyword(&text[at.min(text.len())..]).as_deref() == Some("SELECT")
}

/// Whether a FROM/JOIN at `pos` names tables rather than being part of a
/// call such as `EXTRACT(YEAR FROM x)` or `IS DISTINCT FROM`.
fn is_table_context(text: &str, pos: usize) -> bool {
    let before = text[..pos].trim_end();
    if before.to_ascii_uppercase().ends_with("DISTINCT") {
        let rest = before[..before.len() - "DISTINCT".len()].trim_end();
        if rest.to_ascii_uppercase().ends_with("IS") || rest.to_ascii_uppercase().ends_with("NOT") {
            return false;
        }
    }
    let Some(open) = enclosing_open(text, pos) else {
        return true;
    };
    if starts_select(text, open + 1) {
        return true;
    }
    let prefix = text[..open].trim_end();
    if prefix.ends_with('(') || prefix.ends_with(',') {
        return true;
    }
    let upper = prefix.to_ascii_uppercase();
    upper.ends_with("FROM") || upper.ends_with("JOIN")
}

fn qualify_function_calls(text: &str, options: &ConvertOptions) -> String {
    let mut names: Vec<String> = vec![FIRST_AGGREGATE.to_string(), LAST_AGGREGATE.to_string()];
    names.extend(
        options
            .known_functions
            .iter()
            .filter(|f| !f.contains('.'))
            .map(|f| regex::escape(f)),
    );
    let pattern = format!(r#"(?i)(^|[^\w."$])({})\s*\("#, names.join("|"));
    let Ok(pattern) = Regex::new(&pattern) else {
        return text.to_string();
    };
    replace_outside_literals(text, &pattern, |caps| {
        let whole = &caps[0];
        let lead = &caps[1];
        format!("{}{}.{}", lead, options.schema, &whole[lead.len()..])
    })
}
