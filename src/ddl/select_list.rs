//! SELECT-list analysis for helper extraction and output columns.
//!
//! Translated text is tokenized with sqlparser's PostgreSQL tokenizer to
//! find column references, aggregate and window calls, subqueries and
//! state-store reads inside each SELECT item.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::translate::identifier_utils::{format_token_sql, normalize_identifier, sanitize_identifier};
use crate::translate::scanner::{find_top_level_keyword, find_top_level_keyword_match, split_arguments};

/// Words that are part of expression syntax rather than column names.
const EXPRESSION_WORDS: &[&str] = &[
    "AND", "OR", "NOT", "NULL", "IS", "TRUE", "FALSE", "CASE", "WHEN", "THEN", "ELSE", "END",
    "AS", "IN", "LIKE", "ILIKE", "SIMILAR", "ESCAPE", "BETWEEN", "CAST", "INTERVAL", "DATE",
    "TIME", "TIMESTAMP", "EXTRACT", "FROM", "DISTINCT", "ANY", "ALL", "SOME", "EXISTS", "COLLATE",
    "AT", "ZONE", "INTEGER", "INT", "BIGINT", "SMALLINT", "REAL", "DOUBLE", "PRECISION", "NUMERIC",
    "DECIMAL", "TEXT", "VARCHAR", "BOOLEAN", "UUID", "YEAR", "MONTH", "DAY", "HOUR", "MINUTE",
    "SECOND", "DOW", "DOY", "QUARTER", "WEEK", "EPOCH", "LOCALTIMESTAMP", "LOCALTIME",
    "CURRENT_DATE", "CURRENT_TIMESTAMP", "CURRENT_TIME",
];

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "sum", "avg", "count", "min", "max", "stddev_samp", "stddev_pop", "var_samp", "var_pop",
    "jet_first", "jet_last", "string_agg", "array_agg", "bool_and", "bool_or", "every", "over",
];

/// Clauses that end a SELECT list.
const LIST_END: &[&str] = &[
    "INTO", "FROM", "WHERE", "GROUP BY", "HAVING", "ORDER BY", "LIMIT", "UNION",
];

/// One item of a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub expr: String,
    /// Alias text as written after `AS`
    pub alias: Option<String>,
}

impl SelectItem {
    fn parse(item: &str) -> Self {
        let mut last_as = None;
        let mut from = 0;
        while let Some(pos) = find_top_level_keyword(item, from, &["AS"]) {
            last_as = Some(pos);
            from = pos + 2;
        }
        if let Some(pos) = last_as {
            let alias = item[pos + 2..].trim();
            if is_identifier(alias) {
                return Self {
                    expr: item[..pos].trim().to_string(),
                    alias: Some(alias.to_string()),
                };
            }
        }
        Self {
            expr: item.trim().to_string(),
            alias: None,
        }
    }

    /// `expr AS alias`, or just `expr`.
    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.expr, alias),
            None => self.expr.clone(),
        }
    }

    pub fn is_star(&self) -> bool {
        self.alias.is_none() && (self.expr == "*" || self.expr.ends_with(".*"))
    }
}

fn is_identifier(text: &str) -> bool {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return true;
    }
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

/// A SELECT list located inside a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectList {
    /// Byte offset where the first item starts
    pub start: usize,
    /// Byte offset just past the last item
    pub end: usize,
    pub items: Vec<SelectItem>,
}

impl SelectList {
    /// Locate the top-level SELECT list of `sql`.
    pub fn parse(sql: &str) -> Option<Self> {
        let select = find_top_level_keyword(sql, 0, &["SELECT"])?;
        let mut start = select + "SELECT".len();
        if let Some((pos, kw)) = find_top_level_keyword_match(sql, start, &["DISTINCT", "ALL"]) {
            if sql[start..pos].trim().is_empty() {
                start = pos + kw.len();
            }
        }
        let end = find_top_level_keyword(sql, start, LIST_END).unwrap_or(sql.len());
        let items: Vec<SelectItem> = split_arguments(&sql[start..end])
            .iter()
            .map(|item| SelectItem::parse(item))
            .collect();
        if items.is_empty() {
            return None;
        }
        Some(Self { start, end, items })
    }

    /// Replace the list inside `sql` with `items`.
    pub fn splice(&self, sql: &str, items: &[String]) -> String {
        let tail = sql[self.end..].trim_start();
        let sep = if tail.is_empty() { "" } else { " " };
        format!("{} {}{}{}", sql[..self.start].trim_end(), items.join(", "), sep, tail)
    }
}

/// What a SELECT item expression reads and calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExprInfo {
    /// Distinct column references, as written, in first-use order
    pub columns: Vec<String>,
    /// Unqualified quoted identifiers (candidate parameter names)
    pub bare_names: Vec<String>,
    pub has_aggregate: bool,
    pub has_subquery: bool,
    pub has_state_ref: bool,
}

impl ExprInfo {
    /// True when the expression is nothing but one column reference.
    pub fn is_plain_column(&self, expr: &str) -> bool {
        self.columns.len() == 1 && self.columns[0] == expr.trim()
    }
}

struct Analysis {
    tokens: Vec<Token>,
    /// Token index ranges of column references, paired with their text
    column_spans: Vec<(usize, usize, String)>,
    info: ExprInfo,
}

fn analyze_tokens(expr: &str) -> Option<Analysis> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, expr).tokenize().ok()?;
    let significant: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t, Token::Whitespace(_)))
        .map(|(i, _)| i)
        .collect();

    let mut info = ExprInfo::default();
    let mut column_spans = Vec::new();
    let mut n = 0;
    while n < significant.len() {
        let idx = significant[n];
        let Token::Word(word) = &tokens[idx] else {
            n += 1;
            continue;
        };
        let next = significant.get(n + 1).map(|&i| &tokens[i]);
        let prev = n.checked_sub(1).map(|p| &tokens[significant[p]]);
        let quoted = word.quote_style.is_some();
        let upper = word.value.to_ascii_uppercase();

        if !quoted && upper == "SELECT" {
            info.has_subquery = true;
            n += 1;
            continue;
        }
        if matches!(next, Some(Token::LParen)) {
            if AGGREGATE_FUNCTIONS.contains(&word.value.to_ascii_lowercase().as_str()) {
                info.has_aggregate = true;
            }
            n += 1;
            continue;
        }
        if matches!(prev, Some(Token::DoubleColon | Token::Period))
            || (!quoted && EXPRESSION_WORDS.contains(&upper.as_str()))
        {
            n += 1;
            continue;
        }

        // Column chain: word (. word)*
        let first = n;
        let mut last = n;
        while last + 2 < significant.len()
            && matches!(tokens[significant[last + 1]], Token::Period)
            && matches!(tokens[significant[last + 2]], Token::Word(_))
        {
            last += 2;
        }
        if matches!(significant.get(last + 1).map(|&i| &tokens[i]), Some(Token::LParen)) {
            // qualified function call such as app.jet_first(...)
            if let Token::Word(w) = &tokens[significant[last]] {
                if AGGREGATE_FUNCTIONS.contains(&w.value.to_ascii_lowercase().as_str()) {
                    info.has_aggregate = true;
                }
            }
            n = last + 1;
            continue;
        }
        let text: String = (significant[first]..=significant[last])
            .map(|i| format_token_sql(&tokens[i]))
            .collect();
        if last > first && is_state_alias(&word.value) {
            info.has_state_ref = true;
        }
        if first == last && quoted {
            info.bare_names.push(word.value.clone());
        }
        if !info.columns.contains(&text) {
            info.columns.push(text.clone());
        }
        column_spans.push((significant[first], significant[last], text));
        n = last + 1;
    }

    Some(Analysis {
        tokens,
        column_spans,
        info,
    })
}

fn is_state_alias(word: &str) -> bool {
    word.len() > 2
        && word[..2].eq_ignore_ascii_case("ss")
        && word[2..].bytes().all(|b| b.is_ascii_digit())
}

/// Analyze one SELECT item expression. `None` when it cannot be tokenized.
pub fn analyze(expr: &str) -> Option<ExprInfo> {
    analyze_tokens(expr).map(|a| a.info)
}

/// Rewrite `expr` with each distinct column reference replaced by `$n`.
/// Returns the body and the column references in argument order.
pub fn parameterize(expr: &str) -> Option<(String, Vec<String>)> {
    let analysis = analyze_tokens(expr)?;
    let columns = analysis.info.columns;
    let mut body = String::with_capacity(expr.len());
    let mut i = 0;
    let mut spans = analysis.column_spans.iter().peekable();
    while i < analysis.tokens.len() {
        if let Some((start, end, text)) = spans.peek() {
            if *start == i {
                let position = columns.iter().position(|c| c == text)? + 1;
                body.push_str(&format!("${}", position));
                i = end + 1;
                spans.next();
                continue;
            }
        }
        body.push_str(&format_token_sql(&analysis.tokens[i]));
        i += 1;
    }
    Some((body, columns))
}

/// Column name of an item that is a plain column reference.
pub fn source_column(item: &SelectItem) -> Option<String> {
    let info = analyze(&item.expr)?;
    if !info.is_plain_column(&item.expr) {
        return None;
    }
    let last = item.expr.rsplit('.').next().unwrap_or(&item.expr);
    Some(sanitize_identifier(&normalize_identifier(last)))
}

/// Output column name for a SELECT item at 1-based `position`.
pub fn output_name(item: &SelectItem, position: usize) -> String {
    if let Some(alias) = &item.alias {
        return sanitize_identifier(alias);
    }
    source_column(item).unwrap_or_else(|| format!("expr{}", position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_select_list() {
        let sql = r#"SELECT DISTINCT "name", "qty" * "price" AS Total, CAST(x AS integer) FROM app."orders""#;
        let list = SelectList::parse(sql).unwrap();
        assert_eq!(list.items.len(), 3);
        assert_eq!(list.items[1].expr, r#""qty" * "price""#);
        assert_eq!(list.items[1].alias.as_deref(), Some("Total"));
        assert_eq!(list.items[2].alias, None);
        assert_eq!(&sql[list.end..], r#"FROM app."orders""#);
        assert_eq!(
            list.splice(sql, &["a".to_string(), "b".to_string()]),
            r#"SELECT DISTINCT a, b FROM app."orders""#
        );
    }

    #[test]
    fn test_analyze() {
        let info = analyze(r#""qty" * "price" + t.extra"#).unwrap();
        assert_eq!(info.columns, vec![r#""qty""#, r#""price""#, "t.extra"]);
        assert!(!info.has_aggregate);

        let info = analyze(r#"sum("qty") OVER ()"#).unwrap();
        assert!(info.has_aggregate);
        assert!(analyze(r#"app.jet_first("x")"#).unwrap().has_aggregate);
        assert!(analyze("(SELECT 1)").unwrap().has_subquery);
        assert!(analyze("ss1.value").unwrap().has_state_ref);

        let info = analyze(r#"CASE WHEN "a" IS NULL THEN EXTRACT(YEAR FROM "d")::integer ELSE 0 END"#).unwrap();
        assert_eq!(info.columns, vec![r#""a""#, r#""d""#]);
    }

    #[test]
    fn test_parameterize() {
        let (body, args) = parameterize(r#""qty" * "price" + "qty""#).unwrap();
        assert_eq!(body, "$1 * $2 + $1");
        assert_eq!(args, vec![r#""qty""#, r#""price""#]);

        let (body, _) = parameterize(r#"upper("a") || 'it''s'"#).unwrap();
        assert_eq!(body, "upper($1) || 'it''s'");
    }

    #[test]
    fn test_output_name() {
        let item = SelectItem::parse(r#""t"."Unit Price""#);
        assert_eq!(output_name(&item, 1), "unit_price");
        assert_eq!(output_name(&SelectItem::parse("a + 1"), 2), "expr2");
        assert_eq!(output_name(&SelectItem::parse("a + 1 AS Sum Total"), 2), "expr2");
        assert_eq!(output_name(&SelectItem::parse(r#"a + 1 AS "Grand Total""#), 3), "grand_total");
    }
}
