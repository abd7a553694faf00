//! Bootstrap DDL for legacy aggregates with no PostgreSQL built-in.
//!
//! `First()` and `Last()` translate to calls of `jet_first` / `jet_last`,
//! which have to exist in the target schema before any object using them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::translate::scanner::{in_spans, literal_spans};

pub const FIRST_AGGREGATE: &str = "jet_first";
pub const LAST_AGGREGATE: &str = "jet_last";

static AGGREGATE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({FIRST_AGGREGATE}|{LAST_AGGREGATE})\s*\("))
        .expect("aggregate call pattern is valid")
});

/// Custom aggregates called in `sql`, in first-use order.
pub fn referenced_aggregates(sql: &str) -> Vec<&'static str> {
    let spans = literal_spans(sql);
    let mut found = Vec::new();
    for caps in AGGREGATE_CALL.captures_iter(sql) {
        let Some(m) = caps.get(1) else { continue };
        if in_spans(&spans, m.start()) {
            continue;
        }
        let name = if m.as_str().eq_ignore_ascii_case(FIRST_AGGREGATE) {
            FIRST_AGGREGATE
        } else {
            LAST_AGGREGATE
        };
        if !found.contains(&name) {
            found.push(name);
        }
    }
    found
}

/// State function and aggregate definitions for every custom aggregate
/// `sql` uses. Both are strict, so NULL inputs are skipped.
pub fn bootstrap_statements(schema: &str, sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    for name in referenced_aggregates(sql) {
        let keep = if name == FIRST_AGGREGATE { "$1" } else { "$2" };
        statements.push(format!(
            "CREATE OR REPLACE FUNCTION {schema}.{name}_sfunc(anyelement, anyelement)\n\
             RETURNS anyelement\n\
             LANGUAGE sql IMMUTABLE STRICT\n\
             AS $$ SELECT {keep} $$;"
        ));
        statements.push(format!(
            "CREATE OR REPLACE AGGREGATE {schema}.{name}(anyelement) (\n    \
             SFUNC = {schema}.{name}_sfunc,\n    \
             STYPE = anyelement\n\
             );"
        ));
    }
    statements
}
