//! Target schema introspection for repair prompts

use indexmap::IndexMap;
use sqlx::{PgPool, Row};

use crate::error::RepairError;

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Tables (with columns) and views of one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaContext {
    pub schema: String,
    pub tables: IndexMap<String, Vec<ColumnInfo>>,
    pub views: Vec<String>,
}

impl SchemaContext {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Self::default()
        }
    }

    pub fn with_column(mut self, table: &str, column: &str, data_type: &str) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(ColumnInfo {
                name: column.to_string(),
                data_type: data_type.to_string(),
            });
        self
    }

    /// Read the columns and views of `schema`.
    pub async fn introspect(pool: &PgPool, schema: &str) -> Result<Self, RepairError> {
        let introspection = |source| RepairError::Introspection {
            schema: schema.to_string(),
            source,
        };

        let rows = sqlx::query(
            r#"
            SELECT table_name::text AS table_name,
                   column_name::text AS column_name,
                   data_type::text AS data_type
            FROM information_schema.columns
            WHERE table_schema = $1
            ORDER BY table_name, ordinal_position
            "#,
        )
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(introspection)?;

        let mut context = Self::new(schema);
        for row in rows {
            let table: String = row.try_get("table_name").map_err(introspection)?;
            let column: String = row.try_get("column_name").map_err(introspection)?;
            let data_type: String = row.try_get("data_type").map_err(introspection)?;
            context = context.with_column(&table, &column, &data_type);
        }

        let views = sqlx::query(
            "SELECT table_name::text AS table_name FROM information_schema.views \
             WHERE table_schema = $1 ORDER BY table_name",
        )
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(introspection)?;
        for row in views {
            context.views.push(row.try_get("table_name").map_err(introspection)?);
        }

        tracing::debug!(
            schema,
            tables = context.tables.len(),
            views = context.views.len(),
            "schema introspected"
        );
        Ok(context)
    }

    /// One line per relation: `orders(id integer, status text)`.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .tables
            .iter()
            .map(|(table, columns)| {
                let cols = columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                let kind = if self.views.contains(table) { " [view]" } else { "" };
                format!("{}.{}({}){}", self.schema, table, cols, kind)
            })
            .collect();
        if lines.is_empty() {
            lines.push(format!("(no tables found in schema {})", self.schema));
        }
        lines.join("\n")
    }
}
