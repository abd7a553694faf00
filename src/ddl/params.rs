//! Query parameter resolution.
//!
//! Parameters come from three places, merged in this order: the
//! descriptor's declared list, a `PARAMETERS` clause at the head of the
//! text, and prompt-style bracketed names inferred from the body
//! (`[Enter start date:]`). Duplicates are dropped by sanitized name.

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DeclaredParameter, LegacyType};
use crate::translate::identifier_utils::{normalize_identifier, sanitize_identifier};
use crate::translate::scanner::{in_spans, literal_spans, opaque_end, split_arguments};

static PARAMETERS_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*PARAMETERS\s+([^;]*);").expect("valid pattern"));
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid pattern"));

/// A parameter ready to become a function argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameter {
    /// Legacy name, brackets stripped
    pub name: String,
    /// `p_<sanitized name>`
    pub arg_name: String,
    pub legacy_type: LegacyType,
    pub pg_type: &'static str,
}

impl ResolvedParameter {
    pub fn new(name: &str, legacy_type: LegacyType) -> Self {
        let name = normalize_identifier(name);
        Self {
            arg_name: format!("p_{}", sanitize_identifier(&name)),
            pg_type: pg_type(legacy_type),
            legacy_type,
            name,
        }
    }

    /// The quoted identifier the parameter appears as after syntax
    /// translation.
    pub fn body_name(&self) -> String {
        sanitize_identifier(&self.name)
    }
}

/// PostgreSQL column type for a legacy type.
pub fn pg_type(legacy_type: LegacyType) -> &'static str {
    match legacy_type {
        LegacyType::Boolean => "boolean",
        LegacyType::Byte | LegacyType::Integer => "integer",
        LegacyType::Long => "bigint",
        LegacyType::Currency => "numeric(19,4)",
        LegacyType::Single => "real",
        LegacyType::Double => "double precision",
        LegacyType::Date => "date",
        LegacyType::DateTime => "timestamp",
        LegacyType::Decimal => "numeric",
        LegacyType::Guid => "uuid",
        LegacyType::Memo | LegacyType::Text => "text",
    }
}

/// Look up a type hint by sanitized name.
pub fn type_hint(hints: &IndexMap<String, LegacyType>, name: &str) -> Option<LegacyType> {
    let key = sanitize_identifier(name);
    hints
        .iter()
        .find(|(k, _)| sanitize_identifier(k) == key)
        .map(|(_, t)| *t)
}

/// Declarations from a leading `PARAMETERS a Type, [b c] Type;` clause.
pub fn parse_parameters_clause(sql: &str) -> Vec<DeclaredParameter> {
    let Some(caps) = PARAMETERS_CLAUSE.captures(sql) else {
        return Vec::new();
    };
    split_arguments(&caps[1])
        .into_iter()
        .filter_map(|decl| {
            let decl = decl.trim();
            let (name, rest) = if decl.starts_with('[') {
                let close = decl.find(']')?;
                (&decl[..=close], &decl[close + 1..])
            } else {
                match decl.rsplit_once(char::is_whitespace) {
                    Some((name, ty)) => (name, ty),
                    None => (decl, ""),
                }
            };
            let name = normalize_identifier(name);
            if name.is_empty() {
                return None;
            }
            Some(DeclaredParameter::new(name, LegacyType::parse(rest)))
        })
        .collect()
}

/// Bracketed names in the body that read like input prompts.
///
/// Without the source schema a bare name cannot be told apart from a
/// column, so only prompt-shaped names count: ending in `?` or `:`, or
/// starting with `Enter`, `Type`, `Select`, `Choose` or `Input`.
pub fn infer_parameter_names(sql: &str) -> Vec<String> {
    const PROMPT_PREFIXES: &[&str] = &["enter ", "type ", "select ", "choose ", "input "];
    let spans = literal_spans(sql);
    let bytes = sql.as_bytes();
    let mut names: Vec<String> = Vec::new();
    for caps in BRACKETED.captures_iter(sql) {
        let Some(m) = caps.get(0) else { continue };
        if in_spans(&spans, m.start()) {
            continue;
        }
        let before = m.start().checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(m.end()).copied();
        if matches!(before, Some(b'.' | b'!')) || matches!(after, Some(b'.' | b'!')) {
            continue;
        }
        let name = caps[1].trim();
        let lower = name.to_lowercase();
        let prompt = lower.ends_with('?')
            || lower.ends_with(':')
            || PROMPT_PREFIXES.iter().any(|p| lower.starts_with(p));
        if prompt && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn is_reference_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    name.contains('!')
        || lower.contains("tempvars")
        || lower.starts_with("forms")
        || lower.starts_with("reports")
}

/// Merge declared, clause and inferred parameters into a unique list.
pub fn resolve_parameters(
    declared: &[DeclaredParameter],
    inferred: &[String],
    column_type_hints: &IndexMap<String, LegacyType>,
    sql: &str,
) -> Vec<ResolvedParameter> {
    let from_clause = parse_parameters_clause(sql);
    let inferred = inferred.iter().map(|name| {
        DeclaredParameter::new(
            name.clone(),
            type_hint(column_type_hints, name).unwrap_or_default(),
        )
    });

    let mut seen = HashSet::new();
    declared
        .iter()
        .cloned()
        .chain(from_clause)
        .chain(inferred)
        .filter(|p| !is_reference_name(&p.name))
        .filter(|p| seen.insert(sanitize_identifier(&p.name)))
        .map(|p| ResolvedParameter::new(&p.name, p.legacy_type))
        .collect()
}

/// Replace parameter identifiers in translated text with argument names.
///
/// Only standalone quoted identifiers are replaced; `"t"."start"` stays a
/// column reference.
pub fn bind_parameters(sql: &str, params: &[ResolvedParameter]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        let Some(end) = opaque_end(sql, i) else {
            i += 1;
            continue;
        };
        if bytes[i] == b'"' {
            let qualified = (i > 0 && bytes[i - 1] == b'.') || bytes.get(end) == Some(&b'.');
            let inner = sql[i + 1..end.saturating_sub(1).max(i + 1)].replace("\"\"", "\"");
            if !qualified {
                if let Some(param) = params.iter().find(|p| p.body_name() == inner) {
                    out.push_str(&sql[last..i]);
                    out.push_str(&param.arg_name);
                    last = end;
                }
            }
        }
        i = end;
    }
    out.push_str(&sql[last..]);
    out
}
