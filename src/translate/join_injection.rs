//! State-store join injection for cross-join mode.
//!
//! Every collected [`StateReference`] adds one aliased copy of the state
//! table to the statement's sources and three predicates pinning it to a
//! single `(table_name, column_name, session_id)` row. Where the sources
//! and predicates go depends on the statement shape.

use super::references::state_filter;
use super::scanner::{find_matching_close, find_top_level_keyword};
use crate::config::ConvertOptions;
use crate::error::ConversionError;
use crate::model::{StateReference, StorageLocation};
use crate::util::leading_keyword;

/// Clauses that may follow a WHERE condition.
const AFTER_WHERE: &[&str] = &[
    "GROUP BY",
    "HAVING",
    "WINDOW",
    "ORDER BY",
    "LIMIT",
    "OFFSET",
    "UNION",
    "RETURNING",
];

/// Add joins and predicates for `refs` to an already qualified statement.
pub fn inject_state_joins(
    sql: &str,
    refs: &[StateReference],
    options: &ConvertOptions,
) -> Result<String, ConversionError> {
    if refs.is_empty() {
        return Ok(sql.to_string());
    }
    let joins = StateJoins::new(refs, options);
    match leading_keyword(sql).as_deref() {
        Some("SELECT") => Ok(joins.into_select(sql)),
        Some("UPDATE") => joins.into_update(sql),
        Some("DELETE") => joins.into_delete(sql),
        Some("INSERT") => joins.into_insert(sql),
        other => Err(ConversionError::Unsupported {
            message: format!(
                "state joins cannot be added to a {} statement",
                other.unwrap_or("non-SQL")
            ),
        }),
    }
}

struct StateJoins {
    sources: Vec<String>,
    predicates: String,
}

impl StateJoins {
    fn new(refs: &[StateReference], options: &ConvertOptions) -> Self {
        let table = options.state_table_name();
        Self {
            sources: refs
                .iter()
                .map(|r| format!("{} {}", table, r.alias))
                .collect(),
            predicates: refs
                .iter()
                .map(|r| {
                    state_filter(
                        Some(&r.alias),
                        &StorageLocation::new(r.table.clone(), r.column.clone()),
                        options,
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    fn into_select(&self, sql: &str) -> String {
        let cross = self.sources.join(" CROSS JOIN ");
        match find_top_level_keyword(sql, 0, &["FROM"]) {
            Some(from) => {
                let rest = &sql[from + 4..];
                let joined = format!("{}FROM {} CROSS JOIN {}", &sql[..from], cross, rest.trim_start());
                self.add_where(&joined, from)
            }
            None => {
                let at = find_top_level_keyword(sql, 0, &["WHERE", "GROUP BY", "HAVING", "ORDER BY", "LIMIT", "UNION"])
                    .unwrap_or(sql.len());
                let joined = splice_clause(sql, at, &format!("FROM {}", cross));
                self.add_where(&joined, at)
            }
        }
    }

    fn into_update(&self, sql: &str) -> Result<String, ConversionError> {
        let set = find_top_level_keyword(sql, 0, &["SET"]).ok_or_else(|| ConversionError::Unsupported {
            message: "UPDATE without SET".to_string(),
        })?;
        let list = self.sources.join(", ");
        let joined = match find_top_level_keyword(sql, set, &["FROM"]) {
            Some(from) => format!("{}FROM {}, {}", &sql[..from], list, sql[from + 4..].trim_start()),
            None => {
                let at = find_top_level_keyword(sql, set, &["WHERE", "RETURNING"]).unwrap_or(sql.len());
                splice_clause(sql, at, &format!("FROM {}", list))
            }
        };
        Ok(self.add_where(&joined, set))
    }

    fn into_delete(&self, sql: &str) -> Result<String, ConversionError> {
        let from = find_top_level_keyword(sql, 0, &["FROM"]).ok_or_else(|| ConversionError::Unsupported {
            message: "DELETE without FROM".to_string(),
        })?;
        let list = self.sources.join(", ");
        let joined = match find_top_level_keyword(sql, from, &["USING"]) {
            Some(using) => format!("{}USING {}, {}", &sql[..using], list, sql[using + 5..].trim_start()),
            None => {
                let at = find_top_level_keyword(sql, from, &["WHERE", "RETURNING"]).unwrap_or(sql.len());
                splice_clause(sql, at, &format!("USING {}", list))
            }
        };
        Ok(self.add_where(&joined, from))
    }

    fn into_insert(&self, sql: &str) -> Result<String, ConversionError> {
        if let Some(select) = find_top_level_keyword(sql, 0, &["SELECT"]) {
            return Ok(format!("{}{}", &sql[..select], self.into_select(&sql[select..])));
        }
        let values = find_top_level_keyword(sql, 0, &["VALUES"]).ok_or_else(|| ConversionError::Unsupported {
            message: "INSERT without SELECT or VALUES".to_string(),
        })?;
        let open = sql[values + 6..]
            .find(|c: char| !c.is_whitespace())
            .map(|p| values + 6 + p)
            .filter(|&p| sql.as_bytes()[p] == b'(')
            .ok_or_else(|| ConversionError::Unsupported {
                message: "VALUES without a row".to_string(),
            })?;
        let close = find_matching_close(sql, open).ok_or(ConversionError::Unbalanced {
            delimiter: '(',
            offset: open,
        })?;
        if !sql[close + 1..].trim().is_empty() {
            return Err(ConversionError::Unsupported {
                message: "multi-row VALUES with state references".to_string(),
            });
        }
        Ok(format!(
            "{}SELECT {} FROM {} WHERE {}",
            &sql[..values],
            sql[open + 1..close].trim(),
            self.sources.join(" CROSS JOIN "),
            self.predicates
        ))
    }

    /// AND the predicates into the WHERE that follows `from`, or add one.
    fn add_where(&self, sql: &str, from: usize) -> String {
        if let Some(at) = find_top_level_keyword(sql, from, &["WHERE"]) {
            let cond_start = at + "WHERE".len();
            let cond_end = find_top_level_keyword(sql, cond_start, AFTER_WHERE).unwrap_or(sql.len());
            let condition = sql[cond_start..cond_end].trim();
            let tail = &sql[cond_end..];
            let sep = if tail.is_empty() { "" } else { " " };
            return format!(
                "{}WHERE {} AND ({}){}{}",
                &sql[..at],
                self.predicates,
                condition,
                sep,
                tail
            );
        }
        let at = find_top_level_keyword(sql, from, AFTER_WHERE).unwrap_or(sql.len());
        splice_clause(sql, at, &format!("WHERE {}", self.predicates))
    }
}

/// Insert `clause` at `at`, keeping single spaces around it.
fn splice_clause(sql: &str, at: usize, clause: &str) -> String {
    let head = sql[..at].trim_end();
    let tail = sql[at..].trim_start();
    if tail.is_empty() {
        format!("{} {}", head, clause)
    } else {
        format!("{} {} {}", head, clause, tail)
    }
}
