//! LLM-assisted repair of statements the database rejected
//!
//! A repair is one completion call: the prompt carries the target schema,
//! the control mappings, the legacy text, the failed DDL and the database
//! error. The reply is split into statements and classified.

pub mod client;
pub mod prompt;
pub mod response;
pub mod schema;

pub use client::{CompletionClient, HttpCompletionClient};
pub use schema::{ColumnInfo, SchemaContext};

use crate::config::ConvertOptions;
use crate::error::RepairError;
use crate::model::{ControlMapping, ObjectKind};

/// Warning attached to every repaired object.
pub const LLM_ASSISTED_WARNING: &str = "LLM-assisted conversion: review before relying on it";

/// Everything the repair prompt needs about one failed object.
#[derive(Debug, Clone)]
pub struct RepairRequest<'a> {
    /// Schema-qualified object name
    pub object_name: &'a str,
    pub original_sql: &'a str,
    pub failed_sql: &'a str,
    pub error: &'a str,
    pub schema: &'a SchemaContext,
    pub mapping: &'a ControlMapping,
    pub options: &'a ConvertOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub statements: Vec<String>,
    pub object_kind: ObjectKind,
    pub warnings: Vec<String>,
}

/// Ask the completion service for corrected DDL.
pub async fn repair(
    client: &dyn CompletionClient,
    request: &RepairRequest<'_>,
) -> Result<RepairOutcome, RepairError> {
    let user = prompt::user_message(
        request.object_name,
        &request.schema.summary(),
        &prompt::mapping_summary(request.mapping),
        &request.options.state_table_name(),
        request.original_sql,
        request.failed_sql,
        request.error,
    );
    tracing::info!(object = request.object_name, "requesting LLM repair");

    let reply = client.complete(prompt::SYSTEM_PROMPT, &user).await?;
    let statements = response::parse_reply(&reply)?;
    let object_kind = response::classify(&statements);
    tracing::debug!(
        object = request.object_name,
        statements = statements.len(),
        kind = object_kind.as_str(),
        "repair reply parsed"
    );

    Ok(RepairOutcome {
        statements,
        object_kind,
        warnings: vec![format!("{}: {}", request.object_name, LLM_ASSISTED_WARNING)],
    })
}
