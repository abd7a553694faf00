//! Balanced-expression scanning and identifier sanitizing

use rust_jetport::translate::scanner::{find_top_level_keyword, protected_spans};
use rust_jetport::translate::{find_matching_close, quote_ident, sanitize_identifier, split_arguments};

#[test]
fn test_matching_close_honors_literals() {
    let src = "f('a)', \"b(\", (c)) tail";
    assert_eq!(find_matching_close(src, 1), Some(17));
    assert_eq!(find_matching_close("([x)]", 1), Some(4));
    assert_eq!(find_matching_close("f(a, (b)", 1), None);
}

#[test]
fn test_split_arguments_edge_cases() {
    assert!(split_arguments("").is_empty());
    assert_eq!(split_arguments("a"), vec!["a"]);
    assert_eq!(split_arguments("'x,''y', [a,b], (1, 2)"), vec!["'x,''y'", "[a,b]", "(1, 2)"]);
}

#[test]
fn test_top_level_keyword_skips_nested_and_quoted() {
    let src = "SELECT (SELECT 1 FROM u), 'FROM' AS x FROM t";
    assert_eq!(find_top_level_keyword(src, 0, &["FROM"]), Some(38));
    assert_eq!(find_top_level_keyword("SELECT fromage", 0, &["FROM"]), None);
}

#[test]
fn test_protected_spans_cover_literals_comments_brackets() {
    let src = "a 'b' -- c\n[d] /* e */";
    let spans = protected_spans(src);
    assert_eq!(spans.len(), 4);
    assert_eq!(&src[spans[0].clone()], "'b'");
    assert_eq!(&src[spans[2].clone()], "[d]");
}

#[test]
fn test_sanitize_and_quote() {
    assert_eq!(sanitize_identifier("[Unit Price ($)]"), "unit_price");
    assert_eq!(sanitize_identifier("1st Qtr"), "_1st_qtr");
    assert_eq!(sanitize_identifier("!!"), "unnamed");
    assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
}
