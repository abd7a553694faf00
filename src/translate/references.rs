//! Form, report and session-variable reference resolution.
//!
//! Legacy queries read runtime values straight off open forms
//! (`Forms![Main]![Filter]`), the current form (`Form!Ctrl`, `Me!Ctrl`,
//! `Parent!Sub!Ctrl`) or session variables (`TempVars!Name`). The target
//! database has no forms, so each read becomes a read of the per-session
//! state table instead.
//!
//! One resolver handles both output modes. Without a collector every
//! reference turns into an inline scalar subquery. With a collector every
//! reference turns into `ssN.value` and a [`StateReference`] is pushed so
//! the caller can add the matching joins.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::identifier_utils::{normalize_identifier, quote_literal, sanitize_identifier};
use super::scanner::{in_spans, literal_spans};
use crate::config::ConvertOptions;
use crate::model::{ControlMapping, Diagnostics, StateReference, StorageLocation};

/// Pseudo-table under which session variables are stored.
pub const TEMPVARS_TABLE: &str = "tempvars";

const NAME: &str = r"(\[[^\]]+\]|\w+)";

static THREE_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:\[(forms|reports)\]|\b(forms|reports)\b)\s*[!.]\s*{NAME}\s*[!.]\s*{NAME}"
    ))
    .expect("three-part reference pattern is valid")
});

static TWO_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\[(?:form|report|me|parent)\]|\b(?:form|report|me|parent)\b)((?:\s*!\s*(?:\[[^\]]+\]|\w+))+)")
        .expect("two-part reference pattern is valid")
});

static CHAIN_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\s*(\[[^\]]+\]|\w+)").expect("chain segment pattern is valid")
});

static TEMPVARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)(?:\[tempvars\]|\btempvars\b)\s*(?:!\s*{NAME}|(?:\.\s*item\s*)?\(\s*(?:"([^"]*)"|'([^']*)')\s*\))"#
    ))
    .expect("tempvars pattern is valid")
});

/// Result of resolving the references in one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub sql: String,
    /// Storage entries read, in encounter order (duplicates kept)
    pub referenced: Vec<StorageLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    ThreePart,
    TwoPart,
    TempVar,
}

/// Rewrite every form/report/session-variable reference in `sql`.
///
/// Matches inside string literals and comments are left alone, so the
/// output of an earlier run (which carries `/* UNRESOLVED: ... */`
/// comments) resolves to itself.
pub fn resolve(
    sql: &str,
    mapping: &ControlMapping,
    options: &ConvertOptions,
    mut collector: Option<&mut Vec<StateReference>>,
    diagnostics: &mut Diagnostics,
) -> Resolved {
    let spans = literal_spans(sql);
    let patterns = [
        (Shape::ThreePart, &*THREE_PART),
        (Shape::TwoPart, &*TWO_PART),
        (Shape::TempVar, &*TEMPVARS),
    ];

    let mut out = String::with_capacity(sql.len());
    let mut referenced = Vec::new();
    let mut pos = 0;

    loop {
        // Earliest match of any shape wins; ties go to the higher priority.
        let mut next: Option<(Shape, Captures)> = None;
        for (shape, pattern) in patterns {
            let mut from = pos;
            while let Some(caps) = pattern.captures_at(sql, from) {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(sql.len());
                if in_spans(&spans, start) {
                    from = start + 1;
                    while !sql.is_char_boundary(from) {
                        from += 1;
                    }
                    continue;
                }
                let better = match &next {
                    Some((_, best)) => start < best.get(0).map(|m| m.start()).unwrap_or(0),
                    None => true,
                };
                if better {
                    next = Some((shape, caps));
                }
                break;
            }
        }

        let Some((shape, caps)) = next else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        out.push_str(&sql[pos..whole.start()]);

        let location = match shape {
            Shape::ThreePart => Some(resolve_three_part(&caps, mapping, diagnostics)),
            Shape::TwoPart => resolve_two_part(&caps, mapping, diagnostics),
            Shape::TempVar => Some(resolve_tempvar(&caps)),
        };

        match location {
            Some(location) => {
                out.push_str(&render(&location, options, collector.as_deref_mut()));
                referenced.push(location);
            }
            None => {
                out.push_str(&format!("NULL /* UNRESOLVED: {} */", whole.as_str().replace("*/", "* /")));
            }
        }
        pos = whole.end();
    }
    out.push_str(&sql[pos..]);

    if !referenced.is_empty() {
        tracing::debug!(count = referenced.len(), "resolved state references");
    }
    Resolved {
        sql: out,
        referenced,
    }
}

fn resolve_three_part(
    caps: &Captures,
    mapping: &ControlMapping,
    diagnostics: &mut Diagnostics,
) -> StorageLocation {
    let form = normalize_identifier(caps.get(3).map_or("", |m| m.as_str()));
    let control = normalize_identifier(caps.get(4).map_or("", |m| m.as_str()));
    if let Some(found) = mapping.lookup_qualified(&form, &control) {
        return found.clone();
    }
    let guess = StorageLocation::new(sanitize_identifier(&form), sanitize_identifier(&control));
    diagnostics.warn(format!(
        "Unresolved reference {}: no mapping for {}.{}, assuming table '{}' column '{}'",
        caps.get(0).map_or("", |m| m.as_str()),
        form,
        control,
        guess.table,
        guess.column
    ));
    guess
}

fn resolve_two_part(
    caps: &Captures,
    mapping: &ControlMapping,
    diagnostics: &mut Diagnostics,
) -> Option<StorageLocation> {
    let chain = caps.get(1).map_or("", |m| m.as_str());
    let control = CHAIN_SEGMENT
        .captures_iter(chain)
        .last()
        .and_then(|seg| seg.get(1))
        .map(|m| normalize_identifier(m.as_str()))
        .unwrap_or_default();
    let found = mapping.lookup_control(&control).cloned();
    if found.is_none() {
        diagnostics.warn(format!(
            "Unresolved reference {}: no mapping entry for control '{}'",
            caps.get(0).map_or("", |m| m.as_str()),
            control
        ));
    }
    found
}

fn resolve_tempvar(caps: &Captures) -> StorageLocation {
    let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map_or("", |m| m.as_str());
    StorageLocation::new(TEMPVARS_TABLE, sanitize_identifier(&normalize_identifier(name)))
}

/// Predicate text filtering the state table to one entry.
pub fn state_filter(alias: Option<&str>, location: &StorageLocation, options: &ConvertOptions) -> String {
    let prefix = alias.map(|a| format!("{a}.")).unwrap_or_default();
    format!(
        "{p}table_name={} AND {p}column_name={} AND {p}session_id={}",
        quote_literal(&location.table),
        quote_literal(&location.column),
        options.session_expr(),
        p = prefix
    )
}

fn render(
    location: &StorageLocation,
    options: &ConvertOptions,
    collector: Option<&mut Vec<StateReference>>,
) -> String {
    match collector {
        Some(refs) => {
            let alias = format!("ss{}", refs.len() + 1);
            refs.push(StateReference {
                alias: alias.clone(),
                table: location.table.clone(),
                column: location.column.clone(),
            });
            format!("{alias}.value")
        }
        None => format!(
            "(SELECT value FROM {} WHERE session_id={} AND table_name={} AND column_name={})",
            options.state_table_name(),
            options.session_expr(),
            quote_literal(&location.table),
            quote_literal(&location.column)
        ),
    }
}
