//! Object kind selection by query type code and text

use rust_jetport::{convert, convert_all, ControlMapping, LegacyType, ObjectKind, QueryDescriptor, QueryType};

use crate::common::*;

#[test]
fn test_mutation_codes_become_functions() {
    let cases = [
        (48, "UPDATE [Orders] SET [Status] = 'closed' WHERE [Id] = 1"),
        (32, "DELETE FROM [Orders] WHERE [Id] = 1"),
        (64, "INSERT INTO [Archive] SELECT * FROM [Orders]"),
        (80, "SELECT * INTO [Archive] FROM [Orders]"),
    ];
    for (code, sql) in cases {
        let result = convert(&query("q", code, sql), &ControlMapping::new(), &app_options());
        assert_eq!(result.object_kind, ObjectKind::Function, "code {code}");
        let ddl = main_statement(&result);
        assert!(ddl.contains("LANGUAGE plpgsql"), "code {code}: {ddl}");
        assert!(ddl.contains("GET DIAGNOSTICS affected = ROW_COUNT"), "code {code}");
    }
}

#[test]
fn test_make_table_drops_and_recreates_target() {
    let result = convert(
        &query("Archive", 80, "SELECT [Id], [Name] INTO [Archive] FROM [Orders] WHERE [Closed]"),
        &ControlMapping::new(),
        &app_options(),
    );
    let ddl = main_statement(&result);
    assert!(ddl.contains("DROP TABLE IF EXISTS app.\"archive\";"), "{ddl}");
    assert!(ddl.contains("CREATE TABLE app.\"archive\" AS\n    SELECT \"id\", \"name\" FROM app.\"orders\" WHERE \"closed\";"), "{ddl}");
}

#[test]
fn test_select_code_with_update_text_is_a_function() {
    let result = convert(
        &query("Mislabelled", 0, "UPDATE [T] SET [A] = 1"),
        &ControlMapping::new(),
        &app_options(),
    );
    assert_eq!(result.object_kind, ObjectKind::Function);
}

#[test]
fn test_views_only_for_parameterless_reads() {
    let plain = convert(&query("q", 0, "SELECT [A] FROM [T]"), &ControlMapping::new(), &app_options());
    assert_eq!(plain.object_kind, ObjectKind::View);

    let with_param = query_with_param("q", 0, "SELECT [A] FROM [T] WHERE [A] = [Wanted]", "Wanted", LegacyType::Long);
    let result = convert(&with_param, &ControlMapping::new(), &app_options());
    assert_eq!(result.object_kind, ObjectKind::Function);
    let ddl = main_statement(&result);
    assert!(ddl.contains("(p_wanted bigint)"));
    assert!(ddl.contains("RETURNS TABLE(\"a\" text)"), "{ddl}");
    assert!(ddl.contains("CAST(\"a\" AS text) AS \"a\""));
}

#[test]
fn test_union_is_a_view() {
    let result = convert(
        &query("Both", 128, "SELECT [A] FROM [T] UNION ALL SELECT [A] FROM [U]"),
        &ControlMapping::new(),
        &cross_join_options(),
    );
    assert_eq!(result.object_kind, ObjectKind::View);
    let ddl = main_statement(&result);
    assert!(ddl.contains("FROM app.\"t\" UNION ALL SELECT \"a\" FROM app.\"u\""), "{ddl}");
}

#[test]
fn test_unknown_type_is_kept_as_comment() {
    let result = convert(
        &QueryDescriptor::new("Pass Through", QueryType::Unknown, "EXEC sp_refresh"),
        &ControlMapping::new(),
        &app_options(),
    );
    assert_eq!(result.object_kind, ObjectKind::None);
    assert!(result.statements[0].contains("-- EXEC sp_refresh"));
    assert!(has_warning(&result, "unsupported query type"));
}

#[test]
fn test_convert_all_preserves_order() {
    let queries: Vec<QueryDescriptor> = (0..20)
        .map(|i| query(&format!("q{i}"), 0, &format!("SELECT [A{i}] FROM [T]")))
        .collect();
    let results = convert_all(&queries, &ControlMapping::new(), &app_options());
    assert_eq!(results.len(), 20);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.object_name, format!("app.\"q{i}\""));
    }
}
