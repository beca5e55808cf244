//! Reference rows of the classification graph.
//!
//! Every row is immutable once loaded and keyed by its code. Cross-reference
//! rows carry a "from" code that may end in [`WILDCARD`], meaning the row
//! applies to every code starting with the stripped prefix.

use serde::{Deserialize, Serialize};

/// Suffix marking a cross-reference code as a prefix pattern.
pub const WILDCARD: char = '*';

/// Check whether a cross-reference pattern matches a concrete code.
///
/// A pattern matches if it equals the code exactly, or if it ends in
/// [`WILDCARD`] and the code starts with the pattern minus the marker.
pub fn pattern_matches(pattern: &str, code: &str) -> bool {
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => code.starts_with(prefix),
        None => pattern == code,
    }
}

/// A primary habitat category (e.g. grassland, woodland).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryCategory {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// A primary habitat code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryCode {
    pub code: String,
    /// Category code; resolved against [`PrimaryCategory`] rows
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
    /// NVC community codes associated with this primary, if any
    #[serde(default)]
    pub nvc_codes: Option<String>,
}

/// A group of secondary habitat codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryGroup {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// A secondary habitat code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryCode {
    pub code: String,
    pub group: String,
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// Primary → secondary cross-reference. `primary` may be a wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimarySecondaryXref {
    pub primary: String,
    pub secondary: String,
}

/// Primary → priority habitat cross-reference. Matched exactly, never as a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryPriorityXref {
    pub primary: String,
    pub priority_habitat: String,
}

/// Secondary → priority habitat cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryPriorityXref {
    pub secondary: String,
    pub priority_habitat: String,
}

/// A priority (BAP) habitat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityHabitatCode {
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// A habitat type, used to scope which primaries are offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitatType {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// Habitat type → primary cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitatTypePrimaryXref {
    pub habitat_type: String,
    pub primary: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub preferred: bool,
}

/// Habitat type → secondary cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitatTypeSecondaryXref {
    pub habitat_type: String,
    pub secondary: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub preferred: bool,
}

/// A generic code/description pair (conditions, qualities, importances, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRow {
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// An evidence source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceName {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// A source habitat type, scoped by its habitat class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHabitatType {
    pub code: String,
    pub habitat_class: String,
    #[serde(default)]
    pub description: String,
}

/// The raw tables a [`ClassificationLookup`](crate::ClassificationLookup) is built from.
///
/// Missing tables deserialize as empty, so a lookup can be assembled from a
/// partial document in tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTables {
    pub primary_categories: Vec<PrimaryCategory>,
    pub primary_codes: Vec<PrimaryCode>,
    pub secondary_groups: Vec<SecondaryGroup>,
    pub secondary_codes: Vec<SecondaryCode>,
    pub primary_secondary: Vec<PrimarySecondaryXref>,
    pub primary_priority: Vec<PrimaryPriorityXref>,
    pub secondary_priority: Vec<SecondaryPriorityXref>,
    pub priority_habitats: Vec<PriorityHabitatCode>,
    pub habitat_types: Vec<HabitatType>,
    pub habitat_type_primary: Vec<HabitatTypePrimaryXref>,
    pub habitat_type_secondary: Vec<HabitatTypeSecondaryXref>,
    pub conditions: Vec<CodeRow>,
    pub condition_qualifiers: Vec<CodeRow>,
    pub determination_qualities: Vec<CodeRow>,
    pub interpretation_qualities: Vec<CodeRow>,
    pub sources: Vec<SourceName>,
    pub habitat_classes: Vec<CodeRow>,
    pub source_habitat_types: Vec<SourceHabitatType>,
    pub importances: Vec<CodeRow>,
}
