//! Identifier handling for legacy and PostgreSQL names.
//!
//! Legacy object names are free text (`Order Details`, `2019 Sales`,
//! `Qty/Unit`). Everything that lands in generated DDL goes through
//! [`sanitize_identifier`] so table, column, parameter and function names
//! stay consistent across the whole migration.
//!
//! # Examples
//!
//! ```ignore
//! use crate::translate::identifier_utils::*;
//!
//! assert_eq!(sanitize_identifier("Order Details"), "order_details");
//! assert_eq!(quote_ident("order_details"), "\"order_details\"");
//! assert_eq!(qualify("app", "orders"), "app.orders");
//! ```

use sqlparser::tokenizer::Token;

/// Normalizes an arbitrary legacy name into a lowercase snake_case identifier.
///
/// Runs of characters outside `[a-z0-9]` collapse into one underscore,
/// leading and trailing underscores are dropped, a leading digit gets an
/// underscore prefix and an empty result becomes `unnamed`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_identifier("  Qty / Unit "), "qty_unit");
/// assert_eq!(sanitize_identifier("2019 Sales"), "_2019_sales");
/// assert_eq!(sanitize_identifier("***"), "unnamed");
/// ```
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_underscore = false;

    for c in normalize_identifier(name).chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_underscore && !out.is_empty() {
                out.push('_');
            }
            pending_underscore = false;
            out.push(c);
        } else {
            pending_underscore = true;
        }
    }

    if out.is_empty() {
        return "unnamed".to_string();
    }
    if out.as_bytes()[0].is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}

/// Strips brackets `[]` and double quotes `""` from an identifier.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_identifier("[MyTable]"), "MyTable");
/// assert_eq!(normalize_identifier("\"MyColumn\""), "MyColumn");
/// ```
pub fn normalize_identifier(ident: &str) -> String {
    ident
        .trim()
        .trim_matches(|c| c == '[' || c == ']' || c == '"')
        .to_string()
}

/// Wraps a name in PostgreSQL double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a PostgreSQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Prefixes `name` with `schema.` unless it is already qualified.
pub fn qualify(schema: &str, name: &str) -> String {
    if is_qualified_name(name) {
        name.to_string()
    } else {
        format!("{}.{}", schema, name)
    }
}

/// Name of a generated object: `schema."sanitized_name"`.
pub fn object_name(schema: &str, name: &str) -> String {
    format!("{}.{}", schema, quote_ident(&sanitize_identifier(name)))
}

/// Checks whether a name carries a schema qualifier outside of quotes.
///
/// # Examples
///
/// ```ignore
/// assert!(is_qualified_name("app.orders"));
/// assert!(is_qualified_name("app.\"orders\""));
/// assert!(!is_qualified_name("\"odd.name\""));
/// ```
pub fn is_qualified_name(name: &str) -> bool {
    let mut in_quotes = false;
    for c in name.trim().chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => return true,
            _ => {}
        }
    }
    false
}

/// Converts a sqlparser-rs Token back to PostgreSQL text.
///
/// Escapes single quotes inside string literals by doubling them, and keeps
/// the original quoting of identifiers, so a token stream can be reassembled
/// into SQL that parses the same way.
pub fn format_token_sql(token: &Token) -> String {
    match token {
        Token::Word(w) => match w.quote_style {
            Some('"') => quote_ident(&w.value),
            Some(q) => format!("{}{}{}", q, w.value, q),
            None => w.value.clone(),
        },
        Token::Number(n, _) => n.clone(),
        Token::SingleQuotedString(s) => quote_literal(s),
        Token::EscapedStringLiteral(s) => format!("E'{}'", s.replace('\'', "\\'")),
        Token::DollarQuotedString(s) => s.to_string(),
        Token::Whitespace(ws) => ws.to_string(),
        Token::DoubleColon => "::".to_string(),
        Token::StringConcat => "||".to_string(),
        Token::Neq => "<>".to_string(),
        _ => token.to_string(),
    }
}
