//! Conversion output types

use serde::Serialize;

use super::StorageLocation;

/// Category of the synthesized target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    View,
    Function,
    None,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::View => "view",
            ObjectKind::Function => "function",
            ObjectKind::None => "none",
        }
    }
}

/// A scalar helper function pulled out of a calculated SELECT column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFunction {
    /// Schema-qualified, quoted function name
    pub name: String,
    /// The output column the expression produced
    pub alias: String,
    /// Complete `CREATE OR REPLACE FUNCTION` statement
    pub definition: String,
}

/// One form/report/session-variable read joined in from the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateReference {
    /// `ss1`, `ss2`, ... in encounter order
    pub alias: String,
    pub table: String,
    pub column: String,
}

/// Warnings collected while converting a single query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}

/// Everything produced by converting one legacy query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    /// DDL statements in execution order
    pub statements: Vec<String>,
    pub object_name: String,
    pub object_kind: ObjectKind,
    pub warnings: Vec<String>,
    pub extracted_functions: Vec<ExtractedFunction>,
    pub referenced_storage_entries: Vec<StorageLocation>,
    /// False when function translation hit its pass cap
    pub translation_converged: bool,
}

impl ConversionResult {
    /// All statements joined into one deployable script.
    pub fn script(&self) -> String {
        let mut script = String::new();
        for statement in &self.statements {
            script.push_str(statement.trim_end());
            script.push_str("\n\n");
        }
        script
    }
}
