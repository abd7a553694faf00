//! Legacy query descriptors

use serde::{Deserialize, Serialize};

use crate::translate::scanner::find_top_level_keyword;
use crate::util::leading_keyword;

/// Kind of legacy query, as recorded in the source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawQueryType", rename_all = "kebab-case")]
pub enum QueryType {
    Select,
    Update,
    Delete,
    Insert,
    MakeTable,
    Crosstab,
    Union,
    Unknown,
}

impl QueryType {
    /// Map a legacy QueryDef type code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => QueryType::Select,
            16 => QueryType::Crosstab,
            32 => QueryType::Delete,
            48 => QueryType::Update,
            64 => QueryType::Insert,
            80 => QueryType::MakeTable,
            128 => QueryType::Union,
            _ => QueryType::Unknown,
        }
    }

    /// Map a query type name (`"select"`, `"make-table"`, `"append"`, ...).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "select" => QueryType::Select,
            "update" => QueryType::Update,
            "delete" => QueryType::Delete,
            "insert" | "append" => QueryType::Insert,
            "make-table" | "maketable" => QueryType::MakeTable,
            "crosstab" | "pivot" => QueryType::Crosstab,
            "union" => QueryType::Union,
            _ => QueryType::Unknown,
        }
    }

    /// Infer the query type from the statement text alone.
    pub fn from_sql(sql: &str) -> Self {
        match leading_keyword(sql).as_deref() {
            Some("TRANSFORM") => QueryType::Crosstab,
            Some("UPDATE") => QueryType::Update,
            Some("DELETE") => QueryType::Delete,
            Some("INSERT") => QueryType::Insert,
            Some("SELECT") => {
                if find_top_level_keyword(sql, 0, &["UNION"]).is_some() {
                    QueryType::Union
                } else if find_top_level_keyword(sql, 0, &["INTO"]).is_some() {
                    QueryType::MakeTable
                } else {
                    QueryType::Select
                }
            }
            Some("PARAMETERS") => {
                let body = sql.split_once(';').map(|(_, rest)| rest).unwrap_or("");
                QueryType::from_sql(body)
            }
            _ => QueryType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Select => "select",
            QueryType::Update => "update",
            QueryType::Delete => "delete",
            QueryType::Insert => "insert",
            QueryType::MakeTable => "make-table",
            QueryType::Crosstab => "crosstab",
            QueryType::Union => "union",
            QueryType::Unknown => "unknown",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQueryType {
    Code(i64),
    Name(String),
}

impl From<RawQueryType> for QueryType {
    fn from(raw: RawQueryType) -> Self {
        match raw {
            RawQueryType::Code(code) => QueryType::from_code(code),
            RawQueryType::Name(name) => match name.trim().parse::<i64>() {
                Ok(code) => QueryType::from_code(code),
                Err(_) => QueryType::from_name(&name),
            },
        }
    }
}

/// Declared type of a legacy query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "RawLegacyType", rename_all = "lowercase")]
pub enum LegacyType {
    Boolean,
    Byte,
    Integer,
    Long,
    Currency,
    Single,
    Double,
    Date,
    DateTime,
    Decimal,
    Guid,
    Memo,
    #[default]
    Text,
}

impl LegacyType {
    /// Parse a legacy type name; anything unrecognised is text.
    pub fn parse(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        // "Text (255)" and "Decimal(18,2)" carry a size suffix
        let base = lower.split(['(', ' ']).next().unwrap_or("");
        match base {
            "boolean" | "bit" | "yesno" | "logical" => LegacyType::Boolean,
            "byte" | "tinyint" => LegacyType::Byte,
            "integer" | "short" | "smallint" | "int" => LegacyType::Integer,
            "long" | "counter" | "autonumber" => LegacyType::Long,
            "currency" | "money" => LegacyType::Currency,
            "single" | "ieeesingle" | "real" => LegacyType::Single,
            "double" | "ieeedouble" | "float" | "number" => LegacyType::Double,
            "date" => LegacyType::Date,
            "datetime" | "time" | "timestamp" => LegacyType::DateTime,
            "decimal" | "numeric" => LegacyType::Decimal,
            "guid" | "uniqueidentifier" | "replicationid" => LegacyType::Guid,
            "memo" | "longtext" | "longchar" => LegacyType::Memo,
            _ => match lower.parse::<i64>() {
                Ok(code) => LegacyType::from_code(code),
                Err(_) => LegacyType::Text,
            },
        }
    }

    /// Map a legacy numeric field type code.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => LegacyType::Boolean,
            2 => LegacyType::Byte,
            3 => LegacyType::Integer,
            4 => LegacyType::Long,
            5 => LegacyType::Currency,
            6 => LegacyType::Single,
            7 => LegacyType::Double,
            8 => LegacyType::DateTime,
            12 => LegacyType::Memo,
            15 => LegacyType::Guid,
            20 => LegacyType::Decimal,
            _ => LegacyType::Text,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLegacyType {
    Code(i64),
    Name(String),
}

impl From<RawLegacyType> for LegacyType {
    fn from(raw: RawLegacyType) -> Self {
        match raw {
            RawLegacyType::Code(code) => LegacyType::from_code(code),
            RawLegacyType::Name(name) => LegacyType::parse(&name),
        }
    }
}

/// A parameter declared on the legacy query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredParameter {
    pub name: String,
    #[serde(default, alias = "type")]
    pub legacy_type: LegacyType,
}

impl DeclaredParameter {
    pub fn new(name: impl Into<String>, legacy_type: LegacyType) -> Self {
        Self {
            name: name.into(),
            legacy_type,
        }
    }
}

/// A legacy query as extracted from the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub name: String,
    #[serde(default = "unknown_query_type", alias = "type")]
    pub query_type: QueryType,
    pub sql: String,
    #[serde(default, alias = "parameters")]
    pub declared_parameters: Vec<DeclaredParameter>,
}

fn unknown_query_type() -> QueryType {
    QueryType::Unknown
}

impl QueryDescriptor {
    pub fn new(name: impl Into<String>, query_type: QueryType, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_type,
            sql: sql.into(),
            declared_parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, legacy_type: LegacyType) -> Self {
        self.declared_parameters
            .push(DeclaredParameter::new(name, legacy_type));
        self
    }

    /// The query type that drives DDL synthesis.
    ///
    /// Mutation codes always win. A select or unknown code defers to the
    /// leading keyword of the text, so a mislabelled `UPDATE` still becomes
    /// a procedural function.
    pub fn effective_type(&self) -> QueryType {
        match self.query_type {
            QueryType::Select | QueryType::Unknown => match QueryType::from_sql(&self.sql) {
                QueryType::Unknown => self.query_type,
                inferred => inferred,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(QueryType::from_code(48), QueryType::Update);
        assert_eq!(QueryType::from_code(32), QueryType::Delete);
        assert_eq!(QueryType::from_code(64), QueryType::Insert);
        assert_eq!(QueryType::from_code(80), QueryType::MakeTable);
        assert_eq!(QueryType::from_code(96), QueryType::Unknown);
    }

    #[test]
    fn test_from_sql() {
        assert_eq!(QueryType::from_sql("SELECT a INTO b FROM c"), QueryType::MakeTable);
        assert_eq!(QueryType::from_sql("SELECT a FROM b UNION SELECT a FROM c"), QueryType::Union);
        assert_eq!(
            QueryType::from_sql("SELECT a FROM b WHERE a IN (SELECT x FROM y UNION SELECT z FROM w)"),
            QueryType::Select
        );
        assert_eq!(QueryType::from_sql("TRANSFORM Sum(x) SELECT y FROM t PIVOT z"), QueryType::Crosstab);
        assert_eq!(
            QueryType::from_sql("PARAMETERS [p] Long; DELETE * FROM t WHERE id = [p]"),
            QueryType::Delete
        );
    }

    #[test]
    fn test_effective_type_prefers_mutation_codes() {
        let q = QueryDescriptor::new("q", QueryType::Delete, "SELECT * FROM t");
        assert_eq!(q.effective_type(), QueryType::Delete);

        let q = QueryDescriptor::new("q", QueryType::Select, "UPDATE t SET a = 1");
        assert_eq!(q.effective_type(), QueryType::Update);
    }

    #[test]
    fn test_legacy_type_parse() {
        assert_eq!(LegacyType::parse("Text (255)"), LegacyType::Text);
        assert_eq!(LegacyType::parse("Long"), LegacyType::Long);
        assert_eq!(LegacyType::parse("IEEEDouble"), LegacyType::Double);
        assert_eq!(LegacyType::parse("4"), LegacyType::Long);
        assert_eq!(LegacyType::parse("whatever"), LegacyType::Text);
    }

    #[test]
    fn test_descriptor_json() {
        let json = r#"{
            "name": "Delete Old",
            "type": 32,
            "sql": "DELETE * FROM [Orders] WHERE [Id] = [Which]",
            "parameters": [{"name": "Which", "type": "Long"}]
        }"#;
        let q: QueryDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(q.query_type, QueryType::Delete);
        assert_eq!(q.declared_parameters[0].legacy_type, LegacyType::Long);

        let q: QueryDescriptor =
            serde_json::from_str(r#"{"name": "x", "query_type": "make-table", "sql": ""}"#).unwrap();
        assert_eq!(q.query_type, QueryType::MakeTable);
    }
}
