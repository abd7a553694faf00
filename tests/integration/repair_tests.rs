//! Repair fallback with a scripted completion client

use rust_jetport::repair::{repair, RepairRequest, SchemaContext, LLM_ASSISTED_WARNING};
use rust_jetport::{convert, ObjectKind, RepairError};

use crate::common::*;

const ORIGINAL: &str = "SELECT [Nme] FROM [Orders] WHERE [Status] = Forms!Main!Filter";

fn schema() -> SchemaContext {
    SchemaContext::new("app")
        .with_column("orders", "name", "text")
        .with_column("orders", "status", "text")
}

#[tokio::test]
async fn test_repair_replaces_failed_statements() {
    let mapping = orders_mapping();
    let options = app_options();
    let converted = convert(&query("Open", 0, ORIGINAL), &mapping, &options);
    let failed = converted.script();
    let schema = schema();

    let client = FakeCompletionClient::replying(
        "Here is the fix:\n```sql\nCREATE OR REPLACE VIEW app.\"open\" AS\nSELECT name FROM app.orders;\n```",
    );
    let outcome = repair(
        &client,
        &RepairRequest {
            object_name: &converted.object_name,
            original_sql: ORIGINAL,
            failed_sql: &failed,
            error: "column \"nme\" does not exist",
            schema: &schema,
            mapping: &mapping,
            options: &options,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.object_kind, ObjectKind::View);
    assert_eq!(outcome.statements.len(), 1);
    assert!(outcome.statements[0].ends_with("SELECT name FROM app.orders;"));
    assert!(outcome.warnings[0].contains(LLM_ASSISTED_WARNING));

    assert_eq!(client.calls(), 1);
    let prompt = client.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(ORIGINAL));
    assert!(prompt.contains("column \"nme\" does not exist"));
    assert!(prompt.contains("main.filter -> orders.status"));
    assert!(prompt.contains("app.orders(name text, status text)"));
}

#[tokio::test]
async fn test_repair_splits_multiple_statements() {
    let mapping = orders_mapping();
    let options = app_options();
    let schema = schema();
    let client = FakeCompletionClient::replying(
        "CREATE OR REPLACE FUNCTION app.\"h\"(anycompatible) RETURNS anycompatible LANGUAGE sql IMMUTABLE AS $$ SELECT $1; $$;\n\
         CREATE OR REPLACE FUNCTION app.\"q\"(p_x integer) RETURNS SETOF app.orders LANGUAGE sql STABLE AS $$ SELECT * FROM app.orders $$;",
    );
    let outcome = repair(
        &client,
        &RepairRequest {
            object_name: "app.\"q\"",
            original_sql: "SELECT * FROM [Orders]",
            failed_sql: "CREATE ...",
            error: "syntax error",
            schema: &schema,
            mapping: &mapping,
            options: &options,
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome.statements.len(), 2);
    assert_eq!(outcome.object_kind, ObjectKind::Function);
}

#[tokio::test]
async fn test_service_errors_are_hard_errors() {
    let mapping = orders_mapping();
    let options = app_options();
    let schema = schema();
    let request = RepairRequest {
        object_name: "app.\"q\"",
        original_sql: ORIGINAL,
        failed_sql: "x",
        error: "y",
        schema: &schema,
        mapping: &mapping,
        options: &options,
    };

    let err = repair(&FakeCompletionClient::failing(503), &request).await.unwrap_err();
    assert!(matches!(err, RepairError::ServiceStatus { status: 503, .. }));

    let err = repair(&FakeCompletionClient::replying("```sql\n```"), &request).await.unwrap_err();
    assert!(matches!(err, RepairError::EmptyResponse));
}
