//! Loading lookup tables from YAML or JSON documents.

use std::path::Path;

use tracing::info;

use crate::lookup::{ClassificationLookup, LookupError};
use crate::types::LookupTables;

impl ClassificationLookup {
    /// Load the lookup from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, LookupError> {
        let tables: LookupTables =
            serde_yaml::from_str(yaml).map_err(|e| LookupError::Parse(e.to_string()))?;
        Self::from_tables(tables)
    }

    /// Load the lookup from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, LookupError> {
        let tables: LookupTables =
            serde_json::from_str(json).map_err(|e| LookupError::Parse(e.to_string()))?;
        Self::from_tables(tables)
    }

    /// Load the lookup from a file, choosing the format by extension.
    ///
    /// `.json` is parsed as JSON; anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let lookup = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&text)?,
            _ => Self::from_yaml_str(&text)?,
        };

        info!(path = %path.display(), "Loaded classification lookup");
        Ok(lookup)
    }

    /// Serialize the backing tables to YAML.
    pub fn to_yaml(&self) -> Result<String, LookupError> {
        serde_yaml::to_string(self.tables()).map_err(|e| LookupError::Parse(e.to_string()))
    }
}
