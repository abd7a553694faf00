//! Executing converted statements, with one repair attempt on failure

use sqlx::PgPool;

use crate::config::ConvertOptions;
use crate::error::DeployError;
use crate::model::{ControlMapping, ConversionResult, ObjectKind};
use crate::repair::{self, CompletionClient, RepairRequest, SchemaContext};

/// What [`apply_with_repair`] did for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub object_name: String,
    /// Statements executed successfully
    pub executed: usize,
    /// Whether the executed statements came from repair
    pub repaired: bool,
    pub object_kind: ObjectKind,
    pub warnings: Vec<String>,
}

/// Input to [`apply_with_repair`].
#[derive(Debug, Clone)]
pub struct DeployRequest<'a> {
    pub result: &'a ConversionResult,
    /// Legacy query text, for the repair prompt
    pub original_sql: &'a str,
    pub mapping: &'a ControlMapping,
    pub options: &'a ConvertOptions,
}

/// Statements worth sending to the server.
pub fn executable_statements(statements: &[String]) -> Vec<&str> {
    statements
        .iter()
        .map(|s| s.trim())
        .filter(|s| {
            s.lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .collect()
}

/// Run `statements` in one transaction. On failure the transaction is
/// rolled back and the database message is returned.
async fn execute_all(pool: &PgPool, statements: &[&str]) -> Result<Result<usize, String>, DeployError> {
    let mut tx = pool.begin().await?;
    for statement in statements {
        if let Err(err) = sqlx::query(statement).execute(&mut *tx).await {
            tx.rollback().await?;
            return Ok(Err(err.to_string()));
        }
    }
    tx.commit().await?;
    Ok(Ok(statements.len()))
}

/// Execute a conversion result. When the database rejects it and a
/// completion client is available, repair once and execute the reply.
pub async fn apply_with_repair(
    pool: &PgPool,
    client: Option<&dyn CompletionClient>,
    request: &DeployRequest<'_>,
) -> Result<ApplyReport, DeployError> {
    let result = request.result;
    let statements = executable_statements(&result.statements);
    if statements.is_empty() {
        return Err(DeployError::NothingToDeploy {
            object: result.object_name.clone(),
        });
    }

    let message = match execute_all(pool, &statements).await? {
        Ok(executed) => {
            tracing::info!(object = %result.object_name, executed, "deployed");
            return Ok(ApplyReport {
                object_name: result.object_name.clone(),
                executed,
                repaired: false,
                object_kind: result.object_kind,
                warnings: result.warnings.clone(),
            });
        }
        Err(message) => message,
    };

    let Some(client) = client else {
        return Err(DeployError::Execution {
            object: result.object_name.clone(),
            message,
        });
    };
    tracing::warn!(object = %result.object_name, error = %message, "execution failed, attempting repair");

    let schema = SchemaContext::introspect(pool, &request.options.schema).await?;
    let failed_sql = result.script();
    let outcome = repair::repair(
        client,
        &RepairRequest {
            object_name: &result.object_name,
            original_sql: request.original_sql,
            failed_sql: &failed_sql,
            error: &message,
            schema: &schema,
            mapping: request.mapping,
            options: request.options,
        },
    )
    .await?;

    let repaired = executable_statements(&outcome.statements);
    match execute_all(pool, &repaired).await? {
        Ok(executed) => {
            let mut warnings = result.warnings.clone();
            warnings.extend(outcome.warnings);
            tracing::info!(object = %result.object_name, executed, "deployed after repair");
            Ok(ApplyReport {
                object_name: result.object_name.clone(),
                executed,
                repaired: true,
                object_kind: outcome.object_kind,
                warnings,
            })
        }
        Err(message) => Err(DeployError::RepairedExecution {
            object: result.object_name.clone(),
            message,
        }),
    }
}
