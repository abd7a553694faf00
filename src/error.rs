//! Error types for rust-jetport

use thiserror::Error;

/// Recoverable errors raised by a single conversion stage.
///
/// These never abort a conversion: the pipeline turns them into warnings and
/// continues with the text from before the failing stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("{function}() could not be translated: {message}")]
    FunctionRule { function: String, message: String },

    #[error("unbalanced '{delimiter}' at offset {offset}")]
    Unbalanced { delimiter: char, offset: usize },

    #[error("unsupported construct: {message}")]
    Unsupported { message: String },
}

impl ConversionError {
    /// Create a function rule error.
    pub fn rule(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionRule {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Errors from the LLM repair fallback and schema introspection.
///
/// Unlike [`ConversionError`] these are hard failures: the caller has to
/// know that repair did not produce anything usable.
#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Completion service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion service returned {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    #[error("Completion service returned an empty response")]
    EmptyResponse,

    #[error("Completion response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Schema introspection failed for schema '{schema}'")]
    Introspection {
        schema: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Errors from executing converted statements against the target database.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Statement for '{object}' failed: {message}")]
    Execution { object: String, message: String },

    #[error("Repaired statements for '{object}' failed: {message}")]
    RepairedExecution { object: String, message: String },

    #[error("Query '{object}' produced no deployable statements")]
    NothingToDeploy { object: String },

    #[error(transparent)]
    Repair(#[from] RepairError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
