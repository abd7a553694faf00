//! rust-jetport: converts Access/Jet queries into PostgreSQL objects
//!
//! Each legacy query becomes a view, a parameterized read function or a
//! plpgsql function, together with any helper functions and custom
//! aggregates it needs. Statements the database rejects can be handed to
//! an LLM for one repair attempt (see [`deploy::apply_with_repair`]).

pub mod config;
pub mod ddl;
pub mod deploy;
pub mod error;
pub mod model;
pub mod repair;
pub mod source;
pub mod translate;
pub mod util;

use rayon::prelude::*;

pub use config::{ConvertOptions, JetportConfig, RepairSettings, StateMode};
pub use error::{ConversionError, DeployError, RepairError};
pub use model::{
    ControlMapping, ConversionResult, DeclaredParameter, Diagnostics, LegacyType, ObjectKind,
    QueryDescriptor, QueryType, StorageLocation,
};

use ddl::params::{infer_parameter_names, resolve_parameters};
use ddl::DdlRequest;
use translate::identifier_utils::object_name;
use translate::FunctionTranslator;

/// Batches at least this large are converted on the rayon pool.
const PARALLEL_THRESHOLD: usize = 8;

/// Convert one legacy query with the built-in function catalog.
pub fn convert(
    query: &QueryDescriptor,
    mapping: &ControlMapping,
    options: &ConvertOptions,
) -> ConversionResult {
    convert_with(query, mapping, options, &FunctionTranslator::builtin())
}

/// Convert one legacy query with a specific function translator.
pub fn convert_with(
    query: &QueryDescriptor,
    mapping: &ControlMapping,
    options: &ConvertOptions,
    translator: &FunctionTranslator<'_>,
) -> ConversionResult {
    let mut diagnostics = Diagnostics::new();
    let query_type = query.effective_type();
    tracing::debug!(query = %query.name, query_type = query_type.as_str(), "converting");

    // Stage 1: legacy function calls
    let (text, converged) = match translator.translate(&query.sql) {
        Ok(outcome) => {
            if !outcome.converged {
                diagnostics.warn(format!(
                    "function translation of '{}' did not converge after {} passes; output may be partial",
                    query.name, outcome.passes
                ));
            }
            for err in &outcome.skipped {
                diagnostics.warn(format!("call left untranslated: {}", err));
            }
            tracing::debug!(passes = outcome.passes, "functions translated");
            (outcome.sql, outcome.converged)
        }
        Err(err) => {
            diagnostics.warn(format!("function translation skipped: {}", err));
            (query.sql.clone(), true)
        }
    };

    // Stage 2: parameters, read from the legacy text
    let inferred = infer_parameter_names(&query.sql);
    let params = resolve_parameters(
        &query.declared_parameters,
        &inferred,
        &options.column_types,
        &query.sql,
    );

    // Stage 3: references, delimiters, operators, qualification, joins
    let cross_join = options.state_mode == StateMode::CrossJoin
        && !matches!(query_type, QueryType::Union | QueryType::Crosstab);
    let mut state_refs = Vec::new();
    let syntax = translate::translate_syntax(
        &text,
        mapping,
        options,
        &mut diagnostics,
        cross_join.then_some(&mut state_refs),
    );

    // Stage 4: DDL
    let synthesized = ddl::synthesize(
        &DdlRequest {
            name: &query.name,
            sql: &syntax.sql,
            original: &query.sql,
            params: &params,
            query_type,
        },
        options,
        &mut diagnostics,
    );

    let mut referenced_storage_entries: Vec<StorageLocation> = Vec::new();
    for location in syntax.referenced {
        if !referenced_storage_entries.contains(&location) {
            referenced_storage_entries.push(location);
        }
    }

    ConversionResult {
        statements: synthesized.statements,
        object_name: object_name(&options.schema, &query.name),
        object_kind: synthesized.object_kind,
        warnings: diagnostics.into_warnings(),
        extracted_functions: synthesized.extracted_functions,
        referenced_storage_entries,
        translation_converged: converged,
    }
}

/// Convert a batch of queries, preserving input order.
pub fn convert_all(
    queries: &[QueryDescriptor],
    mapping: &ControlMapping,
    options: &ConvertOptions,
) -> Vec<ConversionResult> {
    if queries.len() < PARALLEL_THRESHOLD {
        return queries
            .iter()
            .map(|q| convert(q, mapping, options))
            .collect();
    }
    queries
        .par_iter()
        .map(|q| convert(q, mapping, options))
        .collect()
}
