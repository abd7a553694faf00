//! Legacy query text translation
//!
//! Function calls are rewritten first ([`functions`]), then the syntax
//! translator resolves references, converts delimiters and operators and
//! qualifies names ([`syntax`]).

pub mod function_catalog;
pub mod functions;
pub mod identifier_utils;
pub mod join_injection;
pub mod references;
pub mod scanner;
pub mod syntax;

pub use function_catalog::{FunctionRule, BUILTIN_RULES};
pub use functions::{translate, FunctionTranslator, TranslateOutcome, MAX_PASSES};
pub use identifier_utils::{quote_ident, sanitize_identifier};
pub use join_injection::inject_state_joins;
pub use references::{resolve, Resolved};
pub use scanner::{find_matching_close, split_arguments};
pub use syntax::{translate_syntax, SyntaxOutput};
