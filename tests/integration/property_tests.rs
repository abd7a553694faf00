//! Determinism, idempotence and termination

use pretty_assertions::assert_eq;
use rust_jetport::translate::syntax::qualify_names;
use rust_jetport::translate::{split_arguments, FunctionRule, FunctionTranslator, MAX_PASSES};
use rust_jetport::{convert, convert_with, ControlMapping};

use crate::common::*;

#[test]
fn test_conversion_is_deterministic() {
    let q = query(
        "Mixed",
        0,
        "SELECT IIf(IsNull([A]), 0, [A]) AS V, Nz([B], \"x\") FROM [T] WHERE [C] = Forms!Main!Filter",
    );
    let first = convert(&q, &orders_mapping(), &cross_join_options());
    let second = convert(&q, &orders_mapping(), &cross_join_options());
    assert_eq!(first, second);
}

#[test]
fn test_function_translation_is_idempotent() {
    let sql = "SELECT DateAdd(\"d\", 7, [Due]), Mid([Name], 2, 3), Format([Due], \"yyyy-mm-dd\") FROM [T]";
    let once = rust_jetport::translate::translate(sql).unwrap();
    let twice = rust_jetport::translate::translate(&once.sql).unwrap();
    assert_eq!(twice.sql, once.sql);
    assert!(twice.converged);
}

#[test]
fn test_schema_qualification_applies_once() {
    let options = app_options();
    let once = qualify_names("SELECT * FROM orders o JOIN app.items i ON o.id = i.id", &options).unwrap();
    assert_eq!(once, "SELECT * FROM app.orders o JOIN app.items i ON o.id = i.id");
    assert_eq!(qualify_names(&once, &options).unwrap(), once);
}

#[test]
fn test_cross_join_state_table_is_not_qualified_twice() {
    let q = query("q", 0, "SELECT [A] FROM [T] WHERE [B] = Forms!Main!Filter AND [C] = Forms!Main!Region");
    let result = convert(&q, &orders_mapping(), &cross_join_options());
    let ddl = main_statement(&result);
    assert!(!ddl.contains("app.app."), "{ddl}");
    assert!(ddl.contains("app.session_state ss1 CROSS JOIN app.session_state ss2"), "{ddl}");
    assert_eq!(result.referenced_storage_entries.len(), 2);
}

#[test]
fn test_argument_splitting() {
    let args = split_arguments(r#""a,b", g(1,2), "c\"d""#);
    assert_eq!(args.len(), 3);
    assert_eq!(args[1], "g(1,2)");
}

fn grow(args: &[String]) -> Result<String, String> {
    Ok(format!("Grow(Grow({}))", args.join(", ")))
}

#[test]
fn test_non_convergence_is_flagged_not_fatal() {
    let rules = vec![FunctionRule::new("Grow", grow)];
    let translator = FunctionTranslator::new(&rules);
    let result = convert_with(
        &query("Runaway", 0, "SELECT Grow(1) AS X FROM [T]"),
        &ControlMapping::new(),
        &app_options(),
        &translator,
    );
    assert!(!result.translation_converged);
    assert!(has_warning(&result, &format!("did not converge after {} passes", MAX_PASSES)));
    assert!(!result.statements.is_empty());
}

#[test]
fn test_failed_stage_keeps_text_and_warns() {
    let result = convert(&query("Broken", 0, "SELECT IIf([A], 1 FROM [T]"), &ControlMapping::new(), &app_options());
    assert!(has_warning(&result, "function translation skipped"));
    assert!(result.translation_converged);
}

#[test]
fn test_failing_rule_only_skips_its_own_call() {
    let result = convert(
        &query("Due", 0, "SELECT DateAdd(\"fortnight\", 1, [Added]), UCase([Name]) FROM [T]"),
        &ControlMapping::new(),
        &app_options(),
    );
    assert!(has_warning(&result, "call left untranslated: DateAdd()"));
    assert!(!has_warning(&result, "function translation skipped"));
    let main = main_statement(&result);
    assert!(main.contains("upper(\"name\")"), "{main}");
    assert!(main.contains("DateAdd('fortnight', 1, \"added\")"), "{main}");
}
