//! Configuration for incid editing.

use serde::{Deserialize, Serialize};

use crate::types::{CoreError, Result};

/// Configuration for an incid editing session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidConfig {
    /// Secondary habitat configuration
    pub secondary: SecondaryConfig,
    /// Priority habitat configuration
    pub priority: PriorityConfig,
    /// Evidence source configuration
    pub sources: SourceConfig,
}

impl IncidConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| CoreError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Reject settings the validators cannot work with.
    pub fn check(&self) -> Result<()> {
        let [first, second, third] = &self.sources.precedence;
        if first == second || second == third || first == third {
            return Err(CoreError::Config(format!(
                "importance precedence tokens must be distinct: {first}, {second}, {third}"
            )));
        }
        if self
            .sources
            .precedence
            .iter()
            .any(|t| *t == self.sources.importance_skip)
        {
            return Err(CoreError::Config(
                "importance skip value cannot also be a precedence token".to_string(),
            ));
        }
        Ok(())
    }
}

/// How secondary habitats are ordered for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// By persisted id; new entries last in the order they were added
    #[default]
    AsEntered,
    /// By group sort order, then code sort key
    ByGroupThenCode,
    /// By code sort key
    ByCode,
}

/// Secondary habitat configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryConfig {
    /// Display order of the collection
    pub order: OrderPolicy,
    /// Require secondary codes to be valid for the current primary, rather
    /// than merely known
    pub codes_valid_for_primary: bool,
    /// Group selected whenever the primary changes
    pub preferred_group: Option<String>,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            order: OrderPolicy::AsEntered,
            codes_valid_for_primary: true,
            preferred_group: None,
        }
    }
}

/// Priority habitat configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Flag duplicates when more codes than this appear in both partitions.
    ///
    /// Defaults to 2 to match existing behavior, although any duplicate is
    /// most likely an error.
    pub duplicate_threshold: usize,
    /// Determination quality meaning "not present but close to definition";
    /// only auto rows may use it
    pub not_present_quality: Option<String>,
    /// Maximum length of interpretation comments
    pub max_comment_length: usize,
    /// Determination quality given to placeholders created in bulk mode
    pub bulk_determination_quality: Option<String>,
    /// Interpretation quality given to placeholders created in bulk mode
    pub bulk_interpretation_quality: Option<String>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 2,
            not_present_quality: Some("NP".to_string()),
            max_comment_length: 254,
            bulk_determination_quality: None,
            bulk_interpretation_quality: None,
        }
    }
}

/// Evidence source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source id meaning "no source selected"
    pub unset_source_id: i32,
    /// Importance value exempt from the duplicate and order checks
    pub importance_skip: String,
    /// Importance tokens in the order they must be applied
    pub precedence: [String; 3],
    /// Habitat class meaning "no habitat class"; habitat type is then not required
    pub no_habitat_class: String,
    /// Require at least one source on every incid
    pub require_source: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            unset_source_id: -1,
            importance_skip: "None".to_string(),
            precedence: [
                "Primary".to_string(),
                "Secondary".to_string(),
                "Tertiary".to_string(),
            ],
            no_habitat_class: "none".to_string(),
            require_source: false,
        }
    }
}
