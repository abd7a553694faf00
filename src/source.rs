//! Loading legacy queries and control mappings from disk
//!
//! Queries come from `.json` descriptors (one object or an array) or raw
//! `.sql` files, whose type is taken from the text. A directory is walked
//! recursively; files are read in path order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1252;

use crate::model::{ControlMapping, QueryDescriptor, QueryType};

/// Read a text file as UTF-8, falling back to Windows-1252.
pub fn read_text_with_fallback(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            let (decoded, _, had_errors) = WINDOWS_1252.decode(bytes);
            if had_errors {
                anyhow::bail!("{} contains invalid characters", path.display());
            }
            tracing::debug!(path = %path.display(), "decoded as Windows-1252");
            Ok(decoded.into_owned())
        }
    }
}

fn is_query_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("sql") || ext.eq_ignore_ascii_case("json"))
}

/// Query files under `input` (or `input` itself).
pub fn query_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("Input not found: {}", input.display());
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_query_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Descriptors from one file.
pub fn load_query_file(path: &Path) -> Result<Vec<QueryDescriptor>> {
    let content = read_text_with_fallback(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        if content.trim_start().starts_with('[') {
            return serde_json::from_str(&content)
                .with_context(|| format!("Invalid query descriptors in {}", path.display()));
        }
        let query: QueryDescriptor = serde_json::from_str(&content)
            .with_context(|| format!("Invalid query descriptor in {}", path.display()))?;
        return Ok(vec![query]);
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "query".to_string());
    let query_type = QueryType::from_sql(&content);
    Ok(vec![QueryDescriptor::new(name, query_type, content)])
}

/// All descriptors under `input`, in path order.
pub fn load_queries(input: &Path) -> Result<Vec<QueryDescriptor>> {
    let mut queries = Vec::new();
    for file in query_files(input)? {
        queries.extend(load_query_file(&file)?);
    }
    tracing::info!(count = queries.len(), input = %input.display(), "queries loaded");
    Ok(queries)
}

/// A JSON control mapping; no path means an empty mapping.
pub fn load_mapping(path: Option<&Path>) -> Result<ControlMapping> {
    let Some(path) = path else {
        return Ok(ControlMapping::new());
    };
    let content = read_text_with_fallback(path)?;
    serde_json::from_str(&content).with_context(|| format!("Invalid control mapping in {}", path.display()))
}
