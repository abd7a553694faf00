//! Control mapping and reference resolution

use rust_jetport::model::{Diagnostics, StateReference};
use rust_jetport::translate::references::resolve;
use rust_jetport::{ControlMapping, StorageLocation};

use crate::common::app_options;

#[test]
fn test_two_part_tie_break_is_first_in_insertion_order() {
    let mapping = ControlMapping::new()
        .with("orders.code", "orders", "code")
        .with("customers.code", "customers", "code");
    assert_eq!(
        mapping.lookup_control("Code"),
        Some(&StorageLocation::new("orders", "code"))
    );

    let reversed = ControlMapping::new()
        .with("customers.code", "customers", "code")
        .with("orders.code", "orders", "code");
    assert_eq!(reversed.lookup_control("code").unwrap().table, "customers");
}

#[test]
fn test_bare_control_key_beats_suffix_match() {
    let mapping = ControlMapping::new()
        .with("orders.code", "orders", "code")
        .with("code", "globals", "code");
    assert_eq!(mapping.lookup_control("code").unwrap().table, "globals");
    assert_eq!(mapping.lookup_qualified("Orders", "Code").unwrap().table, "orders");
    assert_eq!(mapping.lookup_qualified("Other", "Code").unwrap().table, "globals");
}

#[test]
fn test_mapping_from_json_keeps_order() {
    let mapping: ControlMapping = serde_json::from_str(
        r#"{"Zeta.Ctl": {"table": "z", "column": "c"}, "Alpha.Ctl": {"storageTable": "a", "storageColumn": "c"}}"#,
    )
    .unwrap();
    let keys: Vec<&str> = mapping.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["zeta.ctl", "alpha.ctl"]);
    assert_eq!(mapping.lookup_control("ctl").unwrap().table, "z");
}

#[test]
fn test_each_request_starts_aliases_at_one() {
    let mapping = ControlMapping::new().with("main.filter", "orders", "status");
    let options = app_options();
    for _ in 0..2 {
        let mut refs: Vec<StateReference> = Vec::new();
        let mut diags = Diagnostics::new();
        let out = resolve("a = Forms!Main!Filter", &mapping, &options, Some(&mut refs), &mut diags);
        assert_eq!(out.sql, "a = ss1.value");
        assert_eq!(refs.len(), 1);
    }
}

#[test]
fn test_tempvars_shapes_resolve_to_pseudo_table() {
    let options = app_options();
    let mut diags = Diagnostics::new();
    for text in ["TempVars!UserId", "TempVars(\"UserId\")", "TempVars.Item(\"UserId\")", "[TempVars]![UserId]"] {
        let out = resolve(text, &ControlMapping::new(), &options, None, &mut diags);
        assert_eq!(out.referenced, vec![StorageLocation::new("tempvars", "userid")], "{text}");
    }
    assert!(diags.is_empty());
}
