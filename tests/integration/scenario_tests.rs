//! End-to-end conversion scenarios

use pretty_assertions::assert_eq;
use rust_jetport::{convert, ControlMapping, LegacyType, ObjectKind, StorageLocation};

use crate::common::*;

#[test]
fn test_calculated_column_becomes_view_and_helper() {
    let q = query("Order Totals", 0, "SELECT [Name], [Qty]*[Price] AS Total FROM [Orders]");
    let result = convert(&q, &ControlMapping::new(), &app_options());

    assert_eq!(result.object_kind, ObjectKind::View);
    assert_eq!(result.object_name, "app.\"order_totals\"");
    assert_eq!(result.extracted_functions.len(), 1);
    assert_eq!(result.extracted_functions[0].alias, "Total");
    assert_eq!(result.statements.len(), 2);
    assert_eq!(result.statements[0], result.extracted_functions[0].definition);
    assert_eq!(
        main_statement(&result),
        "CREATE OR REPLACE VIEW app.\"order_totals\" AS\n\
         SELECT \"name\", app.\"order_totals_total\"(\"qty\", \"price\") AS Total FROM app.\"orders\";"
    );
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert!(result.translation_converged);
}

#[test]
fn test_form_reference_in_subquery_mode() {
    let q = query("Filtered", 0, "SELECT * FROM [T] WHERE [Forms]![Main]![Filter] = [T].[Status]");
    let result = convert(&q, &orders_mapping(), &app_options());

    assert_eq!(result.object_kind, ObjectKind::View);
    assert_eq!(
        main_statement(&result),
        "CREATE OR REPLACE VIEW app.\"filtered\" AS\n\
         SELECT * FROM app.\"t\" WHERE (SELECT value FROM app.session_state WHERE \
         session_id=current_setting('app.session_id', true) AND table_name='orders' AND \
         column_name='status') = \"t\".\"status\";"
    );
    assert_eq!(
        result.referenced_storage_entries,
        vec![StorageLocation::new("orders", "status")]
    );
}

#[test]
fn test_form_reference_in_cross_join_mode() {
    let q = query(
        "Filtered",
        0,
        "SELECT * FROM [T] WHERE [T].[Active] = True AND [Forms]![Main]![Filter] = [T].[Status]",
    );
    let result = convert(&q, &orders_mapping(), &cross_join_options());

    let ddl = main_statement(&result);
    assert!(ddl.contains("FROM app.session_state ss1 CROSS JOIN app.\"t\""), "{ddl}");
    assert!(ddl.contains(
        "WHERE ss1.table_name='orders' AND ss1.column_name='status' AND \
         ss1.session_id=current_setting('app.session_id', true) AND \
         (\"t\".\"active\" = True AND ss1.value = \"t\".\"status\")"
    ), "{ddl}");
    assert_eq!(ddl.matches("app.session_state").count(), 1);
}

#[test]
fn test_delete_with_parameter_is_a_function() {
    let q = query_with_param(
        "Purge Old",
        32,
        "DELETE * FROM [Orders] WHERE [OrderDate] < [Cutoff]",
        "Cutoff",
        LegacyType::DateTime,
    );
    let result = convert(&q, &ControlMapping::new(), &app_options());

    assert_eq!(result.object_kind, ObjectKind::Function);
    let ddl = main_statement(&result);
    assert!(ddl.starts_with("CREATE OR REPLACE FUNCTION app.\"purge_old\"(p_cutoff timestamp)"), "{ddl}");
    assert!(ddl.contains("DELETE FROM app.\"orders\" WHERE \"orderdate\" < p_cutoff;"), "{ddl}");
    assert!(!ddl.contains("VIEW"));
}

#[test]
fn test_unresolved_two_part_reference() {
    let q = query("Lost", 0, "SELECT * FROM [T] WHERE [Status] = Form!UnknownCtrl");
    let result = convert(&q, &ControlMapping::new(), &app_options());

    assert!(main_statement(&result).contains("NULL /* UNRESOLVED: Form!UnknownCtrl */"));
    assert!(has_warning(&result, "Form!UnknownCtrl"));
    assert!(result.referenced_storage_entries.is_empty());
}

#[test]
fn test_crosstab_is_a_commented_view_stub() {
    let sql = "TRANSFORM Sum([Qty]) AS Total\nSELECT [Region] FROM [Orders] GROUP BY [Region]\nPIVOT [Month]";
    let result = convert(&query("Sales Pivot", 16, sql), &ControlMapping::new(), &app_options());

    assert_eq!(result.object_kind, ObjectKind::View);
    assert_eq!(result.statements.len(), 1);
    let stub = &result.statements[0];
    assert!(stub.lines().all(|line| line.starts_with("--")));
    assert!(stub.contains("-- TRANSFORM Sum([Qty]) AS Total"));
    assert!(stub.contains("-- PIVOT [Month]"));
    assert!(has_warning(&result, "manual conversion"));
}

#[test]
fn test_legacy_functions_and_literals() {
    let q = query(
        "Recent",
        0,
        "SELECT TOP 10 [Name] & \" (\" & UCase([Code]) & \")\" AS Label FROM [Items] WHERE [Added] >= #1/31/2024# AND [Name] LIKE \"A*\" ORDER BY [Added] DESC",
    );
    let result = convert(&q, &ControlMapping::new(), &app_options());
    let ddl = main_statement(&result);

    assert!(ddl.contains("\"added\" >= DATE '2024-01-31'"), "{ddl}");
    assert!(ddl.contains("\"name\" ILIKE 'A%'"), "{ddl}");
    assert!(ddl.ends_with("ORDER BY \"added\" DESC LIMIT 10;"), "{ddl}");
    assert!(!ddl.contains("TOP"));
    assert_eq!(result.extracted_functions.len(), 1);
    assert!(result.extracted_functions[0]
        .definition
        .contains("$1 || ' (' || upper($2) || ')'"));
}

#[test]
fn test_first_last_bootstrap_aggregates() {
    let q = query("Firsts", 0, "SELECT [Region], First([Name]) AS FirstName FROM [Orders] GROUP BY [Region]");
    let result = convert(&q, &ControlMapping::new(), &app_options());

    assert_eq!(result.statements.len(), 3);
    assert!(result.statements[0].contains("app.jet_first_sfunc"));
    assert!(result.statements[1].starts_with("CREATE OR REPLACE AGGREGATE app.jet_first(anyelement)"));
    assert!(main_statement(&result).contains("app.jet_first(\"name\") AS FirstName"));
    assert!(result.extracted_functions.is_empty());
}

#[test]
fn test_prompt_parameter_select_becomes_function() {
    let q = query("By Date", 0, "SELECT * FROM [Orders] WHERE [OrderDate] >= [Enter start date:]");
    let options = app_options().with_column_type("Enter start date:", LegacyType::Date);
    let result = convert(&q, &ControlMapping::new(), &options);

    assert_eq!(result.object_kind, ObjectKind::Function);
    let ddl = main_statement(&result);
    assert!(ddl.starts_with("CREATE OR REPLACE FUNCTION app.\"by_date\"(p_enter_start_date date)"), "{ddl}");
    assert!(ddl.contains("RETURNS SETOF app.\"orders\""));
    assert!(ddl.contains("\"orderdate\" >= p_enter_start_date"));
}
