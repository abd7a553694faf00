//! DDL statement text for each kind of generated object.
//!
//! Every writer returns one complete statement terminated by `;`.

use super::params::ResolvedParameter;

/// Argument list for a generated function: `p_start date, p_qty integer`.
pub fn argument_list(params: &[ResolvedParameter]) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", p.arg_name, p.pg_type))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn write_view(name: &str, body: &str) -> String {
    format!("CREATE OR REPLACE VIEW {} AS\n{};", name, body.trim())
}

/// A read-only `LANGUAGE sql` function. `returns` is the text after
/// `RETURNS`, e.g. `SETOF app."orders"` or `TABLE("name" text)`.
pub fn write_select_function(
    name: &str,
    params: &[ResolvedParameter],
    returns: &str,
    body: &str,
) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {}({})\nRETURNS {}\nLANGUAGE sql STABLE\nAS $$\n{}\n$$;",
        name,
        argument_list(params),
        returns,
        body.trim()
    )
}

/// A plpgsql function running `statements` and returning the row count
/// of the last one.
pub fn write_mutation_function(
    name: &str,
    params: &[ResolvedParameter],
    statements: &[String],
) -> String {
    let mut body = String::new();
    for statement in statements {
        body.push_str("    ");
        body.push_str(statement.trim().trim_end_matches(';'));
        body.push_str(";\n");
    }
    format!(
        "CREATE OR REPLACE FUNCTION {}({})\n\
         RETURNS integer\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         DECLARE\n    affected integer;\n\
         BEGIN\n\
         {}    GET DIAGNOSTICS affected = ROW_COUNT;\n    RETURN affected;\n\
         END;\n\
         $$;",
        name,
        argument_list(params),
        body
    )
}

/// `DROP TABLE IF EXISTS` + `CREATE TABLE ... AS` wrapped in a plpgsql
/// function.
pub fn write_make_table_function(
    name: &str,
    params: &[ResolvedParameter],
    target: &str,
    select: &str,
) -> String {
    write_mutation_function(
        name,
        params,
        &[
            format!("DROP TABLE IF EXISTS {}", target),
            format!("CREATE TABLE {} AS\n    {}", target, select.trim()),
        ],
    )
}

/// A SQL comment block: a header line followed by `text`, every line
/// prefixed with `-- `.
pub fn write_comment(header: &str, text: &str) -> String {
    let mut out = format!("-- {}", header);
    for line in text.lines() {
        out.push_str("\n-- ");
        out.push_str(line.trim_end());
    }
    out
}

/// A scalar helper over positional `anycompatible` arguments.
pub fn write_helper_function(name: &str, arity: usize, body: &str) -> String {
    let args = vec!["anycompatible"; arity].join(", ");
    format!(
        "CREATE OR REPLACE FUNCTION {}({})\nRETURNS anycompatible\nLANGUAGE sql IMMUTABLE\nAS $$ SELECT {} $$;",
        name, args, body
    )
}
