//! Catalog of legacy built-in functions and their PostgreSQL rewrites.
//!
//! Each rule pairs a legacy function name with a transform over the call's
//! raw argument texts. Transforms run before syntax translation, so they
//! receive legacy-flavored arguments (`"strings"`, `[names]`) and may emit
//! legacy-flavored text back; later stages convert it.
//!
//! Rule order is significant: within a pass the engine applies rules in the
//! order they appear in [`BUILTIN_RULES`].

use once_cell::sync::Lazy;
use regex::Regex;

use super::scanner::{split_arguments, walk_top_level};
use crate::ddl::aggregates::{FIRST_AGGREGATE, LAST_AGGREGATE};
use crate::error::ConversionError;

/// Rewrites the argument list of one call into replacement text.
pub type Transform = fn(&[String]) -> Result<String, String>;

/// A single legacy function rewrite.
pub struct FunctionRule {
    name: &'static str,
    matcher: Regex,
    transform: Transform,
}

impl std::fmt::Debug for FunctionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRule").field("name", &self.name).finish()
    }
}

impl FunctionRule {
    /// Build a rule matching calls to `name` (case-insensitive).
    ///
    /// Qualified calls (`x.name(`) and quoted or bracketed names are not
    /// matched, so rewritten output that happens to share a name is left
    /// alone.
    pub fn new(name: &'static str, transform: Transform) -> Self {
        let pattern = format!(r#"(?i)(?:^|[^\w.$"\]])({})\s*\("#, regex::escape(name));
        Self {
            name,
            matcher: Regex::new(&pattern).expect("function rule pattern is valid"),
            transform,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Locate the next call at or after `from`, returning the byte offsets
    /// of the function name and of its opening parenthesis.
    pub(crate) fn find_call(&self, text: &str, from: usize) -> Option<(usize, usize)> {
        let mut start = from.min(text.len()).saturating_sub(1);
        while !text.is_char_boundary(start) {
            start -= 1;
        }
        let caps = self.matcher.captures_at(text, start)?;
        let name = caps.get(1)?;
        let whole = caps.get(0)?;
        if name.start() < from {
            return self.find_call(text, name.end());
        }
        Some((name.start(), whole.end() - 1))
    }

    /// Run the transform, attributing failures to this rule.
    pub fn apply(&self, args: &[String]) -> Result<String, ConversionError> {
        (self.transform)(args).map_err(|message| ConversionError::rule(self.name, message))
    }
}

/// The built-in catalog, compiled once.
pub static BUILTIN_RULES: Lazy<Vec<FunctionRule>> = Lazy::new(|| {
    vec![
        // Conditionals
        FunctionRule::new("IIf", iif),
        FunctionRule::new("Switch", switch),
        FunctionRule::new("Choose", choose),
        FunctionRule::new("Nz", nz),
        FunctionRule::new("IsNull", is_null),
        FunctionRule::new("IsNumeric", is_numeric),
        // Strings
        FunctionRule::new("Len", |a| unary(a, |x| format!("length({x})"))),
        FunctionRule::new("UCase", |a| unary(a, |x| format!("upper({x})"))),
        FunctionRule::new("LCase", |a| unary(a, |x| format!("lower({x})"))),
        FunctionRule::new("Trim", |a| unary(a, |x| format!("btrim({x})"))),
        FunctionRule::new("StrReverse", |a| unary(a, |x| format!("reverse({x})"))),
        FunctionRule::new("Space", |a| unary(a, |x| format!("repeat(' ', {x})"))),
        FunctionRule::new("Asc", |a| unary(a, |x| format!("ascii({x})"))),
        FunctionRule::new("Mid", mid),
        FunctionRule::new("InStr", instr),
        FunctionRule::new("String", string_fn),
        FunctionRule::new("Val", |a| {
            unary(a, |x| {
                format!("CAST(NULLIF(substring(btrim({x}) from '^[-+]?[0-9]*\\.?[0-9]*'), '') AS numeric)")
            })
        }),
        FunctionRule::new("Str", |a| unary(a, |x| format!("CAST({x} AS text)"))),
        FunctionRule::new("Format", format_fn),
        // Dates
        FunctionRule::new("Now", |a| nullary(a, "LOCALTIMESTAMP")),
        FunctionRule::new("Date", |a| nullary(a, "CURRENT_DATE")),
        FunctionRule::new("Time", |a| nullary(a, "LOCALTIME")),
        FunctionRule::new("Year", |a| extract(a, "YEAR")),
        FunctionRule::new("Month", |a| extract(a, "MONTH")),
        FunctionRule::new("Day", |a| extract(a, "DAY")),
        FunctionRule::new("Hour", |a| extract(a, "HOUR")),
        FunctionRule::new("Minute", |a| extract(a, "MINUTE")),
        FunctionRule::new("Second", |a| extract(a, "SECOND")),
        FunctionRule::new("Weekday", |a| {
            unary(a, |x| format!("(EXTRACT(DOW FROM {x})::integer + 1)"))
        }),
        FunctionRule::new("DateAdd", date_add),
        FunctionRule::new("DateDiff", date_diff),
        FunctionRule::new("DatePart", date_part),
        FunctionRule::new("DateSerial", date_serial),
        FunctionRule::new("DateValue", |a| unary(a, |x| format!("CAST({x} AS date)"))),
        FunctionRule::new("CDate", |a| unary(a, |x| format!("CAST({x} AS timestamp)"))),
        // Conversions
        FunctionRule::new("CInt", |a| cast(a, "integer")),
        FunctionRule::new("CLng", |a| cast(a, "bigint")),
        FunctionRule::new("CSng", |a| cast(a, "real")),
        FunctionRule::new("CDbl", |a| cast(a, "double precision")),
        FunctionRule::new("CCur", |a| cast(a, "numeric(19,4)")),
        FunctionRule::new("CStr", |a| cast(a, "text")),
        FunctionRule::new("CBool", |a| cast(a, "boolean")),
        // Math
        FunctionRule::new("Int", |a| unary(a, |x| format!("floor({x})"))),
        FunctionRule::new("Fix", |a| unary(a, |x| format!("trunc({x})"))),
        FunctionRule::new("Sgn", |a| unary(a, |x| format!("sign({x})"))),
        FunctionRule::new("Sqr", |a| unary(a, |x| format!("sqrt({x})"))),
        FunctionRule::new("Rnd", |_| Ok("random()".to_string())),
        // Aggregates
        FunctionRule::new("StDevP", |a| unary(a, |x| format!("stddev_pop({x})"))),
        FunctionRule::new("StDev", |a| unary(a, |x| format!("stddev_samp({x})"))),
        FunctionRule::new("VarP", |a| unary(a, |x| format!("var_pop({x})"))),
        FunctionRule::new("Var", |a| unary(a, |x| format!("var_samp({x})"))),
        FunctionRule::new("First", |a| unary(a, |x| format!("{FIRST_AGGREGATE}({x})"))),
        FunctionRule::new("Last", |a| unary(a, |x| format!("{LAST_AGGREGATE}({x})"))),
        // Domain aggregates
        FunctionRule::new("DLookup", |a| domain(a, None)),
        FunctionRule::new("DCount", |a| domain(a, Some("COUNT"))),
        FunctionRule::new("DSum", |a| domain(a, Some("SUM"))),
        FunctionRule::new("DAvg", |a| domain(a, Some("AVG"))),
        FunctionRule::new("DMax", |a| domain(a, Some("MAX"))),
        FunctionRule::new("DMin", |a| domain(a, Some("MIN"))),
    ]
});

fn arity(args: &[String], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        if min == max {
            return Err(format!("expected {} argument(s), got {}", min, args.len()));
        }
        return Err(format!(
            "expected {} to {} arguments, got {}",
            min,
            max,
            args.len()
        ));
    }
    Ok(())
}

fn unary(args: &[String], f: impl Fn(&str) -> String) -> Result<String, String> {
    arity(args, 1, 1)?;
    Ok(f(&args[0]))
}

fn nullary(args: &[String], replacement: &str) -> Result<String, String> {
    arity(args, 0, 0)?;
    Ok(replacement.to_string())
}

fn cast(args: &[String], target: &str) -> Result<String, String> {
    unary(args, |x| format!("CAST({x} AS {target})"))
}

fn extract(args: &[String], field: &str) -> Result<String, String> {
    unary(args, |x| format!("EXTRACT({field} FROM {x})::integer"))
}

fn iif(args: &[String]) -> Result<String, String> {
    arity(args, 3, 3)?;
    Ok(format!(
        "CASE WHEN {} THEN {} ELSE {} END",
        args[0], args[1], args[2]
    ))
}

fn switch(args: &[String]) -> Result<String, String> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(format!(
            "expected condition/value pairs, got {} argument(s)",
            args.len()
        ));
    }
    let branches: Vec<String> = args
        .chunks(2)
        .map(|pair| format!("WHEN {} THEN {}", pair[0], pair[1]))
        .collect();
    Ok(format!("CASE {} END", branches.join(" ")))
}

fn choose(args: &[String]) -> Result<String, String> {
    if args.len() < 2 {
        return Err(format!("expected an index and choices, got {} argument(s)", args.len()));
    }
    let branches: Vec<String> = args[1..]
        .iter()
        .enumerate()
        .map(|(n, choice)| format!("WHEN {} THEN {}", n + 1, choice))
        .collect();
    Ok(format!("CASE {} {} END", args[0], branches.join(" ")))
}

fn nz(args: &[String]) -> Result<String, String> {
    arity(args, 1, 2)?;
    let fallback = args.get(1).map(String::as_str).unwrap_or("0");
    Ok(format!("COALESCE({}, {})", args[0], fallback))
}

fn is_null(args: &[String]) -> Result<String, String> {
    unary(args, |x| format!("({x} IS NULL)"))
}

fn is_numeric(args: &[String]) -> Result<String, String> {
    unary(args, |x| {
        format!("(CAST({x} AS text) ~ '^\\s*[-+]?[0-9]+(\\.[0-9]+)?\\s*$')")
    })
}

fn mid(args: &[String]) -> Result<String, String> {
    arity(args, 2, 3)?;
    Ok(format!("substr({})", args.join(", ")))
}

fn instr(args: &[String]) -> Result<String, String> {
    arity(args, 2, 4)?;
    match args.len() {
        2 => Ok(format!("strpos({}, {})", args[0], args[1])),
        _ => {
            // InStr(start, haystack, needle[, compare])
            let (start, haystack, needle) = (&args[0], &args[1], &args[2]);
            let found = format!("strpos(substr({haystack}, {start}), {needle})");
            Ok(format!(
                "CASE WHEN {found} = 0 THEN 0 ELSE {found} + {start} - 1 END"
            ))
        }
    }
}

fn string_fn(args: &[String]) -> Result<String, String> {
    arity(args, 2, 2)?;
    Ok(format!("repeat(left({}, 1), {})", args[1], args[0]))
}

fn date_serial(args: &[String]) -> Result<String, String> {
    arity(args, 3, 3)?;
    Ok(format!("make_date({}, {}, {})", args[0], args[1], args[2]))
}

/// Content of a legacy string literal, or `None` when `arg` is not one.
pub(crate) fn unquote(arg: &str) -> Option<String> {
    let arg = arg.trim();
    let bytes = arg.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let quote = bytes[0];
    if (quote != b'"' && quote != b'\'') || bytes[bytes.len() - 1] != quote {
        return None;
    }
    let inner = &arg[1..arg.len() - 1];
    let doubled = if quote == b'"' { "\"\"" } else { "''" };
    let single = if quote == b'"' { "\"" } else { "'" };
    let mut content = inner.replace(doubled, single);
    if quote == b'"' {
        content = content.replace("\\\"", "\"");
    }
    Some(content)
}

fn interval_unit(arg: &str) -> Result<&'static str, String> {
    let unit = unquote(arg).ok_or_else(|| format!("interval {} must be a string literal", arg))?;
    match unit.to_ascii_lowercase().as_str() {
        "yyyy" => Ok("year"),
        "q" => Ok("quarter"),
        "m" => Ok("month"),
        "y" | "d" | "w" => Ok("day"),
        "ww" => Ok("week"),
        "h" => Ok("hour"),
        "n" => Ok("minute"),
        "s" => Ok("second"),
        other => Err(format!("unknown interval '{}'", other)),
    }
}

fn date_add(args: &[String]) -> Result<String, String> {
    arity(args, 3, 3)?;
    let unit = interval_unit(&args[0])?;
    let (amount, unit) = match unit {
        "quarter" => (format!("({}) * 3", args[1]), "month"),
        other => (format!("({})", args[1]), other),
    };
    Ok(format!("({} + {} * INTERVAL '1 {}')", args[2], amount, unit))
}

fn date_diff(args: &[String]) -> Result<String, String> {
    arity(args, 3, 5)?;
    let unit = interval_unit(&args[0])?;
    let (a, b) = (&args[1], &args[2]);
    let years = format!("(EXTRACT(YEAR FROM {b}) - EXTRACT(YEAR FROM {a}))");
    Ok(match unit {
        "year" => format!("{years}::integer"),
        "quarter" => format!(
            "({years} * 4 + EXTRACT(QUARTER FROM {b}) - EXTRACT(QUARTER FROM {a}))::integer"
        ),
        "month" => format!(
            "({years} * 12 + EXTRACT(MONTH FROM {b}) - EXTRACT(MONTH FROM {a}))::integer"
        ),
        "week" => format!("((CAST({b} AS date) - CAST({a} AS date)) / 7)"),
        "day" => format!("(CAST({b} AS date) - CAST({a} AS date))"),
        "hour" => format!("floor(EXTRACT(EPOCH FROM ({b} - {a})) / 3600)::bigint"),
        "minute" => format!("floor(EXTRACT(EPOCH FROM ({b} - {a})) / 60)::bigint"),
        _ => format!("floor(EXTRACT(EPOCH FROM ({b} - {a})))::bigint"),
    })
}

fn date_part(args: &[String]) -> Result<String, String> {
    arity(args, 2, 4)?;
    let field = match unquote(&args[0]).map(|u| u.to_ascii_lowercase()).as_deref() {
        Some("y") => "DOY",
        Some("w") => {
            return Ok(format!("(EXTRACT(DOW FROM {})::integer + 1)", args[1]));
        }
        _ => match interval_unit(&args[0])? {
            "year" => "YEAR",
            "quarter" => "QUARTER",
            "month" => "MONTH",
            "week" => "WEEK",
            "day" => "DAY",
            "hour" => "HOUR",
            "minute" => "MINUTE",
            _ => "SECOND",
        },
    };
    Ok(format!("EXTRACT({} FROM {})::integer", field, args[1]))
}

fn format_fn(args: &[String]) -> Result<String, String> {
    arity(args, 1, 2)?;
    let value = &args[0];
    let Some(pattern) = args.get(1) else {
        return Ok(format!("CAST({value} AS text)"));
    };
    let pattern = unquote(pattern).ok_or_else(|| "format must be a string literal".to_string())?;
    let named = match pattern.to_ascii_lowercase().as_str() {
        "general date" => Some("MM/DD/YYYY HH12:MI:SS AM"),
        "long date" => Some("FMDay, FMMonth DD, YYYY"),
        "medium date" => Some("DD-Mon-YY"),
        "short date" => Some("MM/DD/YYYY"),
        "long time" => Some("HH12:MI:SS AM"),
        "medium time" => Some("HH12:MI AM"),
        "short time" => Some("HH24:MI"),
        "currency" => Some("FM$999,999,999,990.00"),
        "fixed" => Some("FM999999999990.00"),
        "standard" => Some("FM999,999,999,990.00"),
        "percent" => {
            return Ok(format!("(to_char(({value}) * 100, 'FM999999990.00') || '%')"));
        }
        "yes/no" => return Ok(format!("CASE WHEN {value} THEN 'Yes' ELSE 'No' END")),
        "true/false" => return Ok(format!("CASE WHEN {value} THEN 'True' ELSE 'False' END")),
        _ => None,
    };
    let target = match named {
        Some(target) => target.to_string(),
        None if pattern.chars().all(|c| "0#,.".contains(c)) => {
            format!("FM{}", pattern.replace('#', "9"))
        }
        None => date_format(&pattern),
    };
    Ok(format!("to_char({value}, '{}')", target.replace('\'', "''")))
}

/// Translate a legacy date/time format picture into a `to_char` pattern.
fn date_format(pattern: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "YYYY"),
        ("yy", "YY"),
        ("mmmm", "FMMonth"),
        ("mmm", "Mon"),
        ("mm", "MM"),
        ("m", "FMMM"),
        ("dddd", "FMDay"),
        ("ddd", "Dy"),
        ("dd", "DD"),
        ("d", "FMDD"),
        ("hh", "HH24"),
        ("h", "FMHH24"),
        ("nn", "MI"),
        ("n", "FMMI"),
        ("ss", "SS"),
        ("s", "FMSS"),
        ("am/pm", "AM"),
    ];
    let lower = pattern.to_ascii_lowercase();
    let mut out = String::new();
    let mut i = 0;
    let mut after_hour = false;
    'outer: while i < lower.len() {
        for (legacy, target) in TOKENS {
            if lower[i..].starts_with(legacy) {
                // "mm" right after an hour token means minutes
                let target = if after_hour && legacy.starts_with('m') && legacy.len() <= 2 {
                    "MI"
                } else {
                    target
                };
                after_hour = legacy.starts_with('h');
                out.push_str(target);
                i += legacy.len();
                continue 'outer;
            }
        }
        let c = lower[i..].chars().next().unwrap_or(' ');
        if !c.is_whitespace() && !":/-.,".contains(c) {
            after_hour = false;
        }
        out.push(c);
        i += c.len_utf8();
    }
    out
}

/// Inline a criteria/expression argument of a domain aggregate.
///
/// Criteria are usually built by concatenation, for example
/// `"[ID] = " & [ProdID]` or `"[Name] = '" & [X] & "'"`. Literal pieces
/// become SQL text, expression pieces stay as expressions, and quote or `#`
/// delimiters wrapped around an expression piece are dropped.
fn inline_domain_text(arg: &str) -> String {
    let mut pieces = Vec::new();
    let mut start = 0;
    walk_top_level(arg, 0, |i, depth| {
        if depth == 0 && arg.as_bytes()[i] == b'&' {
            pieces.push(arg[start..i].trim().to_string());
            start = i + 1;
        }
        false
    });
    pieces.push(arg[start..].trim().to_string());

    let parts: Vec<(bool, String)> = pieces
        .into_iter()
        .map(|piece| match unquote(&piece) {
            Some(text) => (true, text),
            None => (false, piece),
        })
        .collect();

    let mut out = String::new();
    for (n, (is_literal, text)) in parts.iter().enumerate() {
        let mut text = text.as_str();
        if *is_literal {
            let prev_is_expr = n > 0 && !parts[n - 1].0;
            let next_is_expr = parts.get(n + 1).is_some_and(|p| !p.0);
            if prev_is_expr {
                text = text.strip_prefix(['\'', '"', '#']).unwrap_or(text);
            }
            if next_is_expr {
                text = text.strip_suffix(['\'', '"', '#']).unwrap_or(text);
            }
        }
        out.push_str(text);
    }
    out
}

fn domain(args: &[String], aggregate: Option<&str>) -> Result<String, String> {
    arity(args, 2, 3)?;
    let expr = inline_domain_text(&args[0]);
    let mut source = inline_domain_text(&args[1]);
    if source.trim().is_empty() {
        return Err("empty domain".to_string());
    }
    if !source.starts_with('[') && source.contains(char::is_whitespace) {
        source = format!("[{}]", source.trim());
    }
    let projection = match aggregate {
        Some(agg) => format!("{}({})", agg, expr),
        None => expr,
    };
    let mut sql = format!("(SELECT {} FROM {}", projection, source.trim());
    if let Some(criteria) = args.get(2) {
        let criteria = inline_domain_text(criteria);
        if !criteria.trim().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(criteria.trim());
        }
    }
    if aggregate.is_none() {
        sql.push_str(" LIMIT 1");
    }
    sql.push(')');
    Ok(sql)
}

/// Split raw argument text and run `rule` over it, for tests and tooling.
pub fn apply_rule_to(rule: &FunctionRule, raw_args: &str) -> Result<String, ConversionError> {
    rule.apply(&split_arguments(raw_args))
}
