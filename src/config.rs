//! Conversion options and the `jetport.toml` file format

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::LegacyType;
use crate::translate::identifier_utils::{quote_literal, sanitize_identifier};

/// How form/report/session-variable reads are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateMode {
    /// One inline scalar subquery per reference
    #[default]
    Subquery,
    /// One aliased state-store join per reference
    CrossJoin,
}

impl std::str::FromStr for StateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "subquery" => Ok(StateMode::Subquery),
            "cross-join" | "crossjoin" => Ok(StateMode::CrossJoin),
            other => Err(format!("unknown state mode '{}'", other)),
        }
    }
}

/// Options for converting queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Target schema for generated objects and bare table names
    pub schema: String,
    /// Name of the per-session state table inside `schema`
    pub state_table: String,
    /// Connection setting holding the current session id
    pub session_setting: String,
    pub state_mode: StateMode,
    /// User-defined functions already deployed to `schema`
    pub known_functions: Vec<String>,
    /// Output column type hints, keyed by column or parameter name
    pub column_types: IndexMap<String, LegacyType>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            state_table: "session_state".to_string(),
            session_setting: "app.session_id".to_string(),
            state_mode: StateMode::Subquery,
            known_functions: Vec::new(),
            column_types: IndexMap::new(),
        }
    }
}

impl ConvertOptions {
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_state_mode(mut self, mode: StateMode) -> Self {
        self.state_mode = mode;
        self
    }

    pub fn with_column_type(mut self, column: &str, legacy_type: LegacyType) -> Self {
        self.column_types
            .insert(sanitize_identifier(column), legacy_type);
        self
    }

    /// Schema-qualified state table, e.g. `app.session_state`.
    pub fn state_table_name(&self) -> String {
        format!("{}.{}", self.schema, self.state_table)
    }

    /// Expression yielding the current session id.
    pub fn session_expr(&self) -> String {
        format!("current_setting({}, true)", quote_literal(&self.session_setting))
    }

    /// Hinted type for a column or parameter name.
    pub fn column_type(&self, name: &str) -> Option<LegacyType> {
        let key = sanitize_identifier(name);
        self.column_types
            .iter()
            .find(|(k, _)| sanitize_identifier(k) == key)
            .map(|(_, t)| *t)
    }
}

/// Settings for the completion service used by repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

/// Contents of `jetport.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetportConfig {
    pub convert: ConvertOptions,
    pub repair: RepairSettings,
}

impl JetportConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid jetport configuration")
    }

    /// Load a config file; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
