//! Parameter resolution and type mapping

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rust_jetport::ddl::params::{pg_type, resolve_parameters};
use rust_jetport::{DeclaredParameter, LegacyType};

#[test]
fn test_declared_then_clause_then_inferred() {
    let declared = vec![DeclaredParameter::new("Region", LegacyType::Text)];
    let inferred = vec!["Enter limit:".to_string(), "region".to_string()];
    let mut hints = IndexMap::new();
    hints.insert("enter_limit".to_string(), LegacyType::Long);

    let params = resolve_parameters(
        &declared,
        &inferred,
        &hints,
        "PARAMETERS [Since] DateTime, [Region] Long;\nSELECT 1",
    );
    let got: Vec<(&str, &str)> = params.iter().map(|p| (p.arg_name.as_str(), p.pg_type)).collect();
    assert_eq!(
        got,
        vec![
            ("p_region", "text"),
            ("p_since", "timestamp"),
            ("p_enter_limit", "bigint"),
        ]
    );
}

#[test]
fn test_references_are_never_parameters() {
    let declared = vec![
        DeclaredParameter::new("Forms!Main!Filter", LegacyType::Text),
        DeclaredParameter::new("[TempVars]![User]", LegacyType::Text),
        DeclaredParameter::new("Reports.Sales.Total", LegacyType::Text),
    ];
    assert!(resolve_parameters(&declared, &[], &IndexMap::new(), "").is_empty());
}

#[test]
fn test_type_names_and_codes() {
    let cases = [
        ("YesNo", "boolean"),
        ("Short", "integer"),
        ("Long", "bigint"),
        ("Currency", "numeric(19,4)"),
        ("IEEESingle", "real"),
        ("Double", "double precision"),
        ("Date", "date"),
        ("DateTime", "timestamp"),
        ("GUID", "uuid"),
        ("Memo", "text"),
        ("Mystery", "text"),
        ("5", "numeric(19,4)"),
    ];
    for (name, expected) in cases {
        assert_eq!(pg_type(LegacyType::parse(name)), expected, "{name}");
    }
}
