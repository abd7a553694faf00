//! Prompt text for the repair request

use crate::model::ControlMapping;

pub const SYSTEM_PROMPT: &str = "\
You convert Microsoft Access (Jet) queries into PostgreSQL DDL.
A previous automatic conversion failed when executed. Return corrected DDL only:
- Output one or more complete statements (CREATE OR REPLACE VIEW or CREATE OR REPLACE FUNCTION), each ending with a semicolon.
- Keep the object name given in the request.
- Use only tables and columns listed in the schema summary.
- Do not add explanations outside SQL comments.

Translation rules:
- IIf(c, a, b) becomes CASE WHEN c THEN a ELSE b END; Switch and Choose become CASE as well.
- Nz(x, d) becomes COALESCE(x, d); IsNull(x) becomes (x IS NULL).
- The & concatenation operator becomes ||.
- #m/d/yyyy# literals become DATE 'yyyy-mm-dd', or TIMESTAMP 'yyyy-mm-dd hh:mm:ss' when a time is present.
- LIKE becomes ILIKE with * mapped to % and ? mapped to _.
- Double-quoted strings become single-quoted literals.
- [Bracketed Names] become lowercase double-quoted identifiers with non-alphanumeric runs replaced by _, e.g. [Order Date] -> \"order_date\".
- Qualify every table and generated function with the target schema exactly once; never re-qualify a qualified name.
- Form controls, report controls and TempVars are read from the state table by (session_id, table_name, column_name), with session_id = current_setting(<session setting>, true), either as a scalar subquery or through a cross-joined alias ssN.
- Make-table queries become a plpgsql function that runs DROP TABLE IF EXISTS then CREATE TABLE ... AS SELECT.
- Update, delete and insert queries become a plpgsql function returning the affected row count from GET DIAGNOSTICS.
- Select queries with parameters become a LANGUAGE sql STABLE function with p_<name> arguments, returning SETOF <table> for SELECT * over one table and RETURNS TABLE(...) otherwise.
- Select queries without parameters become CREATE OR REPLACE VIEW.
- Computed columns may use helper functions declared (anycompatible, ...) RETURNS anycompatible LANGUAGE sql IMMUTABLE; add explicit casts where argument types differ.";

/// One line per mapping entry: `main.filter -> orders.status`.
pub fn mapping_summary(mapping: &ControlMapping) -> String {
    if mapping.is_empty() {
        return "(no control mappings)".to_string();
    }
    mapping
        .iter()
        .map(|(key, loc)| format!("{} -> {}.{}", key, loc.table, loc.column))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The user message for one failed object.
pub fn user_message(
    object_name: &str,
    schema_summary: &str,
    mapping_summary: &str,
    state_table: &str,
    original_sql: &str,
    failed_sql: &str,
    error: &str,
) -> String {
    format!(
        "Object name: {object_name}\n\n\
         Schema:\n{schema_summary}\n\n\
         Control mappings (state table {state_table}):\n{mapping_summary}\n\n\
         Original Access SQL:\n{original_sql}\n\n\
         Converted SQL that failed:\n{failed_sql}\n\n\
         PostgreSQL error:\n{error}\n"
    )
}
