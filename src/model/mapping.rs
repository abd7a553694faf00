//! Control-to-storage mapping

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a form control (or session variable) keeps its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    #[serde(alias = "storageTable", alias = "storage_table")]
    pub table: String,
    #[serde(alias = "storageColumn", alias = "storage_column")]
    pub column: String,
}

impl StorageLocation {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Mapping from `"form.control"` (or a bare `"control"`) to storage.
///
/// Keys are lowercased on insert. Iteration follows insertion order, which
/// decides the winner when a bare control name matches several forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<String, StorageLocation>",
    into = "IndexMap<String, StorageLocation>"
)]
pub struct ControlMapping {
    entries: IndexMap<String, StorageLocation>,
}

impl From<IndexMap<String, StorageLocation>> for ControlMapping {
    fn from(raw: IndexMap<String, StorageLocation>) -> Self {
        let mut mapping = ControlMapping::new();
        for (key, location) in raw {
            mapping.insert(&key, location);
        }
        mapping
    }
}

impl From<ControlMapping> for IndexMap<String, StorageLocation> {
    fn from(mapping: ControlMapping) -> Self {
        mapping.entries
    }
}

impl ControlMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, location: StorageLocation) {
        self.entries.insert(normalize_key(key), location);
    }

    pub fn with(mut self, key: &str, table: &str, column: &str) -> Self {
        self.insert(key, StorageLocation::new(table, column));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StorageLocation)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a form-qualified control: exact `form.control`, then a bare
    /// `control` key, then the first `*.control` entry.
    pub fn lookup_qualified(&self, form: &str, control: &str) -> Option<&StorageLocation> {
        let exact = format!("{}.{}", normalize_part(form), normalize_part(control));
        self.entries
            .get(&exact)
            .or_else(|| self.lookup_control(control))
    }

    /// Resolve a control without a form qualifier: a bare `control` key,
    /// then the first `*.control` entry in insertion order.
    pub fn lookup_control(&self, control: &str) -> Option<&StorageLocation> {
        let control = normalize_part(control);
        if let Some(found) = self.entries.get(&control) {
            return Some(found);
        }
        let suffix = format!(".{}", control);
        self.entries
            .iter()
            .find(|(key, _)| key.ends_with(&suffix))
            .map(|(_, location)| location)
    }
}

fn normalize_part(part: &str) -> String {
    part.trim()
        .trim_matches(|c| c == '[' || c == ']')
        .trim()
        .to_lowercase()
}

fn normalize_key(key: &str) -> String {
    key.split('.').map(normalize_part).collect::<Vec<_>>().join(".")
}
