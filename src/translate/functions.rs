//! Fixed-point driver for legacy function translation.
//!
//! A pass walks the rule catalog in order and rewrites every call site of
//! each rule left to right. Searching resumes after the spliced
//! replacement, so calls exposed by a rewrite (an inner `IIf` inside an
//! outer one, say) are handled by a later pass. Passes repeat until one
//! changes nothing or the pass cap is reached.

use super::function_catalog::{FunctionRule, BUILTIN_RULES};
use super::scanner::{find_matching_close, in_spans, protected_spans, split_arguments};
use crate::error::ConversionError;

/// Upper bound on translation passes.
pub const MAX_PASSES: usize = 20;

/// Result of running the function translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateOutcome {
    pub sql: String,
    /// Passes executed, including the final unchanged one when converged
    pub passes: usize,
    /// False when the pass cap was hit before a fixed point
    pub converged: bool,
    /// Call sites left as written because their transform failed
    pub skipped: Vec<ConversionError>,
}

/// Applies an ordered rule catalog to query text.
#[derive(Debug, Clone, Copy)]
pub struct FunctionTranslator<'a> {
    rules: &'a [FunctionRule],
    max_passes: usize,
}

impl FunctionTranslator<'static> {
    /// Translator over the built-in catalog.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_RULES.as_slice())
    }
}

impl<'a> FunctionTranslator<'a> {
    pub fn new(rules: &'a [FunctionRule]) -> Self {
        Self {
            rules,
            max_passes: MAX_PASSES,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Rewrite every recognized call in `sql`.
    ///
    /// Unknown function names are left untouched. A call whose transform
    /// fails stays as written and is reported in `skipped`; the rest of the
    /// text is still rewritten. An unbalanced call aborts the whole
    /// translation with an error and callers keep the untranslated text.
    pub fn translate(&self, sql: &str) -> Result<TranslateOutcome, ConversionError> {
        let mut text = sql.to_string();
        let mut skipped = Vec::new();
        for pass in 1..=self.max_passes {
            if !self.run_pass(&mut text, &mut skipped)? {
                tracing::debug!(passes = pass, "function translation converged");
                return Ok(TranslateOutcome {
                    sql: text,
                    passes: pass,
                    converged: true,
                    skipped,
                });
            }
        }
        tracing::debug!(passes = self.max_passes, "function translation hit the pass cap");
        Ok(TranslateOutcome {
            sql: text,
            passes: self.max_passes,
            converged: false,
            skipped,
        })
    }

    fn run_pass(
        &self,
        text: &mut String,
        skipped: &mut Vec<ConversionError>,
    ) -> Result<bool, ConversionError> {
        let mut changed = false;
        for rule in self.rules {
            let mut spans = protected_spans(text);
            let mut from = 0;
            while let Some((name_start, open)) = rule.find_call(text, from) {
                if in_spans(&spans, name_start) {
                    from = name_start + 1;
                    continue;
                }
                let close = find_matching_close(text, open).ok_or(ConversionError::Unbalanced {
                    delimiter: '(',
                    offset: open,
                })?;
                let args = split_arguments(&text[open + 1..close]);
                let replacement = match rule.apply(&args) {
                    Ok(replacement) => replacement,
                    Err(err) => {
                        // later passes meet the same call again
                        if !skipped.contains(&err) {
                            skipped.push(err);
                        }
                        from = open + 1;
                        continue;
                    }
                };
                if replacement != text[name_start..=close] {
                    text.replace_range(name_start..=close, &replacement);
                    spans = protected_spans(text);
                    changed = true;
                }
                from = name_start + replacement.len();
            }
        }
        Ok(changed)
    }
}

/// Translate with the built-in catalog.
pub fn translate(sql: &str) -> Result<TranslateOutcome, ConversionError> {
    FunctionTranslator::builtin().translate(sql)
}
