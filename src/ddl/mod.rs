//! PostgreSQL object synthesis from translated query text
//!
//! [`synthesize`] decides which kind of object a query becomes and emits
//! its statements in dependency order: aggregate bootstrap, extracted
//! helpers, then the main object.

pub mod aggregates;
pub mod params;
pub mod select_list;
pub mod writers;

use crate::config::ConvertOptions;
use crate::model::{Diagnostics, ExtractedFunction, ObjectKind, QueryType};
use crate::translate::identifier_utils::{object_name, qualify, quote_ident, sanitize_identifier};
use crate::translate::scanner::{find_top_level_keyword, opaque_end};
use crate::util::{contains_ci, is_word_byte};

use params::{bind_parameters, pg_type, ResolvedParameter};
use select_list::{analyze, output_name, parameterize, source_column, SelectItem, SelectList};

/// Calls that make an expression unsuitable for an IMMUTABLE helper.
const NON_IMMUTABLE_CALLS: &[&str] = &[
    "now(",
    "random(",
    "clock_timestamp",
    "current_",
    "localtime",
    "timeofday",
];

/// Input to [`synthesize`].
#[derive(Debug, Clone)]
pub struct DdlRequest<'a> {
    /// Legacy query name
    pub name: &'a str,
    /// Fully translated, schema-qualified text
    pub sql: &'a str,
    /// Legacy text, used in comment stubs
    pub original: &'a str,
    pub params: &'a [ResolvedParameter],
    pub query_type: QueryType,
}

/// Output of [`synthesize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub statements: Vec<String>,
    pub object_kind: ObjectKind,
    pub extracted_functions: Vec<ExtractedFunction>,
}

/// Build the DDL statements for one translated query.
pub fn synthesize(
    request: &DdlRequest<'_>,
    options: &ConvertOptions,
    diagnostics: &mut Diagnostics,
) -> Synthesized {
    let name = object_name(&options.schema, request.name);
    let sql = request.sql.trim();
    let mut helpers = Vec::new();

    let (main, object_kind) = match request.query_type {
        QueryType::MakeTable => (
            make_table(request, &name, options, diagnostics),
            ObjectKind::Function,
        ),
        QueryType::Crosstab => {
            diagnostics.warn(format!(
                "crosstab query '{}' requires manual conversion (see tablefunc crosstab())",
                request.name
            ));
            (
                writers::write_comment(
                    &format!("Crosstab query {} was not converted. Original text:", name),
                    request.original,
                ),
                ObjectKind::View,
            )
        }
        QueryType::Update | QueryType::Delete | QueryType::Insert => (
            writers::write_mutation_function(
                &name,
                request.params,
                &[bind_parameters(sql, request.params)],
            ),
            ObjectKind::Function,
        ),
        QueryType::Select if !request.params.is_empty() => {
            let body = extract_helpers(sql, request, options, &mut helpers);
            let returns = select_return_type(&body, request.params, options, diagnostics);
            let body = match &returns {
                ReturnShape::Table { body, .. } => body.clone(),
                _ => body,
            };
            (
                writers::write_select_function(
                    &name,
                    request.params,
                    &returns.render(),
                    &bind_parameters(&body, request.params),
                ),
                ObjectKind::Function,
            )
        }
        QueryType::Select => {
            let body = extract_helpers(sql, request, options, &mut helpers);
            (writers::write_view(&name, &body), ObjectKind::View)
        }
        QueryType::Union => {
            if !request.params.is_empty() {
                diagnostics.warn(format!(
                    "parameters of union query '{}' are ignored; union queries are always created as views, parameters or not",
                    request.name
                ));
            }
            (writers::write_view(&name, sql), ObjectKind::View)
        }
        QueryType::Unknown => {
            diagnostics.warn(format!(
                "unsupported query type for '{}'; original text kept as a comment",
                request.name
            ));
            (
                writers::write_comment(
                    &format!("Query {} could not be converted. Original text:", name),
                    request.original,
                ),
                ObjectKind::None,
            )
        }
    };

    let mut statements = aggregates::bootstrap_statements(&options.schema, &main);
    statements.extend(helpers.iter().map(|h: &ExtractedFunction| h.definition.clone()));
    statements.push(main);
    tracing::debug!(
        object = %name,
        kind = object_kind.as_str(),
        statements = statements.len(),
        "object synthesized"
    );

    Synthesized {
        statements,
        object_kind,
        extracted_functions: helpers,
    }
}

fn make_table(
    request: &DdlRequest<'_>,
    name: &str,
    options: &ConvertOptions,
    diagnostics: &mut Diagnostics,
) -> String {
    let sql = bind_parameters(request.sql.trim(), request.params);
    let (target, select) = match find_top_level_keyword(&sql, 0, &["INTO"]) {
        Some(into) => {
            let start = skip_ws(&sql, into + "INTO".len());
            let end = qualified_name_end(&sql, start);
            let select = format!("{} {}", sql[..into].trim_end(), sql[end..].trim_start());
            (qualify(&options.schema, &sql[start..end]), select.trim().to_string())
        }
        None => {
            let target = object_name(&options.schema, &format!("{}_result", request.name));
            diagnostics.warn(format!(
                "make-table query '{}' has no INTO target; writing to {}",
                request.name, target
            ));
            (target, sql.clone())
        }
    };
    writers::write_make_table_function(name, request.params, &target, &select)
}

fn skip_ws(text: &str, mut i: usize) -> usize {
    let bytes = text.as_bytes();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// End of a possibly qualified, possibly quoted name starting at `at`.
fn qualified_name_end(text: &str, at: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = at;
    loop {
        if bytes.get(i) == Some(&b'"') {
            i = opaque_end(text, i).unwrap_or(bytes.len());
        } else {
            while i < bytes.len() && is_word_byte(bytes[i]) {
                i += 1;
            }
        }
        if bytes.get(i) == Some(&b'.') {
            i += 1;
        } else {
            return i;
        }
    }
}

/// Replace eligible calculated SELECT items with helper calls.
fn extract_helpers(
    sql: &str,
    request: &DdlRequest<'_>,
    options: &ConvertOptions,
    helpers: &mut Vec<ExtractedFunction>,
) -> String {
    let Some(list) = SelectList::parse(sql) else {
        return sql.to_string();
    };
    let param_names: Vec<String> = request.params.iter().map(|p| p.body_name()).collect();
    let mut changed = false;
    let mut items = Vec::with_capacity(list.items.len());

    for item in &list.items {
        match helper_for(item, request.name, &param_names, options) {
            Some((call, helper)) => {
                if helpers.iter().any(|h| h.name == helper.name) {
                    items.push(item.render());
                    continue;
                }
                items.push(call);
                helpers.push(helper);
                changed = true;
            }
            None => items.push(item.render()),
        }
    }

    if changed {
        list.splice(sql, &items)
    } else {
        sql.to_string()
    }
}

fn helper_for(
    item: &SelectItem,
    object: &str,
    param_names: &[String],
    options: &ConvertOptions,
) -> Option<(String, ExtractedFunction)> {
    let alias = item.alias.as_ref()?;
    let info = analyze(&item.expr)?;
    if info.columns.is_empty()
        || info.is_plain_column(&item.expr)
        || info.has_aggregate
        || info.has_subquery
        || info.has_state_ref
        || info.bare_names.iter().any(|n| param_names.contains(n))
        || NON_IMMUTABLE_CALLS.iter().any(|c| contains_ci(&item.expr, c))
    {
        return None;
    }
    let (body, columns) = parameterize(&item.expr)?;
    let name = object_name(
        &options.schema,
        &format!("{}_{}", sanitize_identifier(object), sanitize_identifier(alias)),
    );
    let definition = writers::write_helper_function(&name, columns.len(), &body);
    let call = format!("{}({}) AS {}", name, columns.join(", "), alias);
    Some((
        call,
        ExtractedFunction {
            name,
            alias: alias.clone(),
            definition,
        },
    ))
}

/// Return clause of a parameterized read function.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReturnShape {
    /// `SETOF <table>` for `SELECT *` over a single table
    SetOf(String),
    /// `SETOF record` when the columns cannot be listed
    Record,
    /// `TABLE(...)` with the body rewritten to cast each column
    Table { columns: Vec<String>, body: String },
}

impl ReturnShape {
    fn render(&self) -> String {
        match self {
            ReturnShape::SetOf(table) => format!("SETOF {}", table),
            ReturnShape::Record => "SETOF record".to_string(),
            ReturnShape::Table { columns, .. } => format!("TABLE({})", columns.join(", ")),
        }
    }
}

/// Type of a returned column: a hint for the output name, then a hint for
/// the source column, then the type of a parameter returned as-is.
fn output_type(
    item: &SelectItem,
    col: &str,
    params: &[ResolvedParameter],
    options: &ConvertOptions,
) -> Option<&'static str> {
    options
        .column_type(col)
        .or_else(|| source_column(item).and_then(|c| options.column_type(&c)))
        .map(pg_type)
        .or_else(|| {
            let expr = item.expr.trim();
            params
                .iter()
                .find(|p| expr == quote_ident(&p.body_name()))
                .map(|p| p.pg_type)
        })
}

fn select_return_type(
    sql: &str,
    params: &[ResolvedParameter],
    options: &ConvertOptions,
    diagnostics: &mut Diagnostics,
) -> ReturnShape {
    let Some(list) = SelectList::parse(sql) else {
        diagnostics.warn("could not read the SELECT list; function returns SETOF record");
        return ReturnShape::Record;
    };
    if list.items.len() == 1 && list.items[0].expr == "*" && list.items[0].alias.is_none() {
        if let Some(table) = single_source_table(sql, list.end) {
            return ReturnShape::SetOf(table);
        }
    }
    if list.items.iter().any(SelectItem::is_star) {
        diagnostics.warn("star projection over several sources; function returns SETOF record");
        return ReturnShape::Record;
    }

    let mut columns = Vec::with_capacity(list.items.len());
    let mut items = Vec::with_capacity(list.items.len());
    let mut used: Vec<String> = Vec::new();
    let mut untyped = Vec::new();
    for (i, item) in list.items.iter().enumerate() {
        let mut col = output_name(item, i + 1);
        if used.contains(&col) {
            col = format!("{}_{}", col, i + 1);
        }
        let ty = output_type(item, &col, params, options).unwrap_or_else(|| {
            untyped.push(quote_ident(&col));
            "text"
        });
        columns.push(format!("{} {}", quote_ident(&col), ty));
        items.push(format!("CAST({} AS {}) AS {}", item.expr, ty, quote_ident(&col)));
        used.push(col);
    }
    if !untyped.is_empty() {
        diagnostics.warn(format!(
            "no column_types hint for {}; returned as text",
            untyped.join(", ")
        ));
    }
    ReturnShape::Table {
        columns,
        body: list.splice(sql, &items),
    }
}

/// The only table after FROM, when there is no join or comma list.
fn single_source_table(sql: &str, from_search: usize) -> Option<String> {
    let from = find_top_level_keyword(sql, from_search, &["FROM"])?;
    let start = skip_ws(sql, from + "FROM".len());
    let end = find_top_level_keyword(
        sql,
        start,
        &["WHERE", "GROUP BY", "HAVING", "ORDER BY", "LIMIT", "UNION"],
    )
    .unwrap_or(sql.len());
    let source = sql[start..end].trim();
    if source.contains(',') || find_top_level_keyword(source, 0, &["JOIN"]).is_some() {
        return None;
    }
    let name_end = qualified_name_end(source, 0);
    if name_end == 0 {
        return None;
    }
    Some(source[..name_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LegacyType;
    use pretty_assertions::assert_eq;

    fn run(sql: &str, query_type: QueryType, params: &[ResolvedParameter]) -> (Synthesized, Diagnostics) {
        run_with(sql, query_type, params, ConvertOptions::default().with_schema("app"))
    }

    fn run_with(
        sql: &str,
        query_type: QueryType,
        params: &[ResolvedParameter],
        options: ConvertOptions,
    ) -> (Synthesized, Diagnostics) {
        let mut diags = Diagnostics::new();
        let request = DdlRequest {
            name: "Order Totals",
            sql,
            original: "SELECT legacy",
            params,
            query_type,
        };
        (synthesize(&request, &options, &mut diags), diags)
    }

    #[test]
    fn test_view_with_helper() {
        let (out, diags) = run(
            r#"SELECT "name", "qty"*"price" AS Total FROM app."orders""#,
            QueryType::Select,
            &[],
        );
        assert!(diags.is_empty());
        assert_eq!(out.object_kind, ObjectKind::View);
        assert_eq!(out.statements.len(), 2);
        assert_eq!(out.extracted_functions[0].name, r#"app."order_totals_total""#);
        assert!(out.statements[0].contains("AS $$ SELECT $1*$2 $$;"));
        assert_eq!(
            out.statements[1],
            "CREATE OR REPLACE VIEW app.\"order_totals\" AS\n\
             SELECT \"name\", app.\"order_totals_total\"(\"qty\", \"price\") AS Total FROM app.\"orders\";"
        );
    }

    #[test]
    fn test_aggregates_not_extracted() {
        let (out, _) = run(
            r#"SELECT sum("qty") AS n, app.jet_first("a") AS f FROM app."t""#,
            QueryType::Select,
            &[],
        );
        assert!(out.extracted_functions.is_empty());
        assert!(out.statements[0].contains("app.jet_first_sfunc"));
        assert!(out.statements.last().unwrap().starts_with("CREATE OR REPLACE VIEW"));
    }

    #[test]
    fn test_select_with_params_returns_table() {
        let params = vec![ResolvedParameter::new("Start", LegacyType::Date)];
        let (out, _) = run(
            r#"SELECT "name", "qty" + 1 AS n FROM app."t" WHERE "d" > "start""#,
            QueryType::Select,
            &params,
        );
        assert_eq!(out.object_kind, ObjectKind::Function);
        let ddl = out.statements.last().unwrap();
        assert!(ddl.starts_with("CREATE OR REPLACE FUNCTION app.\"order_totals\"(p_start date)"));
        assert!(ddl.contains("RETURNS TABLE(\"name\" text, \"n\" text)"));
        assert!(ddl.contains("CAST(\"name\" AS text) AS \"name\""));
        assert!(ddl.contains("WHERE \"d\" > p_start"));
    }

    #[test]
    fn test_returned_column_types() {
        let params = vec![ResolvedParameter::new("Start", LegacyType::Date)];
        let options = ConvertOptions::default()
            .with_schema("app")
            .with_column_type("qty", LegacyType::Long);
        let (out, diags) = run_with(
            r#"SELECT "qty" AS amount, "start" AS since, "name" FROM app."t" WHERE "d" > "start""#,
            QueryType::Select,
            &params,
            options,
        );
        let ddl = out.statements.last().unwrap();
        assert!(ddl.contains("RETURNS TABLE(\"amount\" bigint, \"since\" date, \"name\" text)"));
        assert!(ddl.contains("CAST(p_start AS date) AS \"since\""));
        assert_eq!(
            diags.warnings().to_vec(),
            vec!["no column_types hint for \"name\"; returned as text".to_string()]
        );
    }

    #[test]
    fn test_select_star_returns_setof() {
        let params = vec![ResolvedParameter::new("Start", LegacyType::Date)];
        let (out, _) = run(r#"SELECT * FROM app."t" WHERE "d" > "start""#, QueryType::Select, &params);
        assert!(out.statements[0].contains("RETURNS SETOF app.\"t\"\nLANGUAGE sql STABLE"));
    }

    #[test]
    fn test_mutations_are_functions() {
        let params = vec![ResolvedParameter::new("Which", LegacyType::Long)];
        for query_type in [QueryType::Delete, QueryType::Update, QueryType::Insert] {
            let (out, _) = run(r#"DELETE FROM app."t" WHERE "id" = "which""#, query_type, &params);
            assert_eq!(out.object_kind, ObjectKind::Function);
            assert!(out.statements[0].contains("LANGUAGE plpgsql"));
            assert!(out.statements[0].contains("\"id\" = p_which;"));
        }
    }

    #[test]
    fn test_make_table() {
        let (out, _) = run(
            r#"SELECT "a" INTO app."archive" FROM app."t""#,
            QueryType::MakeTable,
            &[],
        );
        assert_eq!(out.object_kind, ObjectKind::Function);
        assert!(out.statements[0].contains("DROP TABLE IF EXISTS app.\"archive\";"));
        assert!(out.statements[0].contains("CREATE TABLE app.\"archive\" AS\n    SELECT \"a\" FROM app.\"t\";"));

        let (out, diags) = run(r#"SELECT "a" FROM app."t""#, QueryType::MakeTable, &[]);
        assert!(out.statements[0].contains("app.\"order_totals_result\""));
        assert_eq!(diags.warnings().len(), 1);
    }

    #[test]
    fn test_crosstab_and_unknown_stubs() {
        let (out, diags) = run("TRANSFORM x", QueryType::Crosstab, &[]);
        assert_eq!(out.object_kind, ObjectKind::View);
        assert!(out.statements[0].contains("-- SELECT legacy"));
        assert!(diags.warnings()[0].contains("manual conversion"));

        let (out, diags) = run("ALTER TABLE x", QueryType::Unknown, &[]);
        assert_eq!(out.object_kind, ObjectKind::None);
        assert!(diags.warnings()[0].contains("unsupported query type"));
    }

    #[test]
    fn test_union_ignores_params() {
        let params = vec![ResolvedParameter::new("p", LegacyType::Text)];
        let (out, diags) = run("SELECT 1 UNION SELECT 2", QueryType::Union, &params);
        assert_eq!(out.object_kind, ObjectKind::View);
        assert_eq!(diags.warnings().len(), 1);
        assert!(diags.warnings()[0].contains("union queries are always created as views"));
    }
}
