//! The classification lookup graph and its query surface.
//!
//! Built once from [`LookupTables`] and shared by reference (usually behind an
//! `Arc`) with every component that derives or validates incid data.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::types::*;

/// Error types for lookup construction and queries.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// A referenced code has no row in the named table
    #[error("{table} code not found: {code}")]
    NotFound { table: &'static str, code: String },

    /// Two rows share a key in a table that must be keyed uniquely
    #[error("Duplicate {table} code: {code}")]
    DuplicateKey { table: &'static str, code: String },

    /// The tables document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// The tables document could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A secondary code offered for a habitat type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitatTypeSecondary<'a> {
    pub secondary: &'a SecondaryCode,
    pub mandatory: bool,
    pub preferred: bool,
}

/// Read-only habitat classification graph.
#[derive(Debug, Clone)]
pub struct ClassificationLookup {
    tables: LookupTables,
    primary_by_code: HashMap<String, usize>,
    category_by_code: HashMap<String, usize>,
    secondary_by_code: HashMap<String, usize>,
    group_by_code: HashMap<String, usize>,
    priority_by_code: HashMap<String, usize>,
    source_by_id: HashMap<i32, usize>,
}

fn index_unique<T>(
    table: &'static str,
    rows: &[T],
    key: impl Fn(&T) -> &str,
) -> Result<HashMap<String, usize>, LookupError> {
    let mut index = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let code = key(row);
        if index.insert(code.to_string(), i).is_some() {
            return Err(LookupError::DuplicateKey {
                table,
                code: code.to_string(),
            });
        }
    }
    Ok(index)
}

fn contains_code(rows: &[CodeRow], code: &str) -> bool {
    rows.iter().any(|r| r.code == code)
}

impl ClassificationLookup {
    /// Build the lookup from raw tables, indexing every keyed table.
    pub fn from_tables(tables: LookupTables) -> Result<Self, LookupError> {
        let primary_by_code = index_unique("primary", &tables.primary_codes, |r| &r.code)?;
        let category_by_code =
            index_unique("primary category", &tables.primary_categories, |r| &r.code)?;
        let secondary_by_code = index_unique("secondary", &tables.secondary_codes, |r| &r.code)?;
        let group_by_code =
            index_unique("secondary group", &tables.secondary_groups, |r| &r.code)?;
        let priority_by_code =
            index_unique("priority habitat", &tables.priority_habitats, |r| &r.code)?;

        let mut source_by_id = HashMap::with_capacity(tables.sources.len());
        for (i, source) in tables.sources.iter().enumerate() {
            if source_by_id.insert(source.id, i).is_some() {
                return Err(LookupError::DuplicateKey {
                    table: "source",
                    code: source.id.to_string(),
                });
            }
        }

        debug!(
            primaries = tables.primary_codes.len(),
            secondaries = tables.secondary_codes.len(),
            priority_habitats = tables.priority_habitats.len(),
            "Classification lookup indexed"
        );

        Ok(Self {
            tables,
            primary_by_code,
            category_by_code,
            secondary_by_code,
            group_by_code,
            priority_by_code,
            source_by_id,
        })
    }

    /// The raw tables backing this lookup.
    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    // ---------------------------------------------------------------------
    // Primary codes
    // ---------------------------------------------------------------------

    pub fn primary(&self, code: &str) -> Option<&PrimaryCode> {
        self.primary_by_code
            .get(code)
            .map(|&i| &self.tables.primary_codes[i])
    }

    /// Resolve the category of a primary code.
    ///
    /// Fails with [`LookupError::NotFound`] if either the primary or its
    /// category row is missing.
    pub fn primary_category_of(&self, code: &str) -> Result<&PrimaryCategory, LookupError> {
        let primary = self.primary(code).ok_or_else(|| LookupError::NotFound {
            table: "primary",
            code: code.to_string(),
        })?;
        self.category_by_code
            .get(&primary.category)
            .map(|&i| &self.tables.primary_categories[i])
            .ok_or_else(|| LookupError::NotFound {
                table: "primary category",
                code: primary.category.clone(),
            })
    }

    /// Primary codes offered for a habitat type, in lookup order.
    pub fn primaries_for_habitat_type(&self, habitat_type: &str) -> Vec<&PrimaryCode> {
        self.tables
            .habitat_type_primary
            .iter()
            .filter(|x| x.habitat_type == habitat_type)
            .filter_map(|x| self.primary(&x.primary))
            .collect()
    }

    /// The currently-scoped primary index.
    ///
    /// With no habitat type selected every primary is in scope; otherwise only
    /// those cross-referenced to the type.
    pub fn primary_scope(&self, habitat_type: Option<&str>) -> Vec<&PrimaryCode> {
        match habitat_type {
            Some(ht) => self.primaries_for_habitat_type(ht),
            None => self.tables.primary_codes.iter().collect(),
        }
    }

    // ---------------------------------------------------------------------
    // Secondary codes
    // ---------------------------------------------------------------------

    pub fn secondary(&self, code: &str) -> Option<&SecondaryCode> {
        self.secondary_by_code
            .get(code)
            .map(|&i| &self.tables.secondary_codes[i])
    }

    pub fn is_known_secondary(&self, code: &str) -> bool {
        self.secondary_by_code.contains_key(code)
    }

    pub fn all_secondary_codes(&self) -> impl Iterator<Item = &str> {
        self.tables.secondary_codes.iter().map(|s| s.code.as_str())
    }

    /// Secondary codes valid for a primary code.
    ///
    /// A cross-reference row matches when its primary side equals `primary`
    /// exactly, or is a wildcard pattern whose prefix `primary` starts with.
    /// The result is distinct and ordered by (sort_order, description).
    pub fn secondaries_for(&self, primary: &str) -> Vec<&SecondaryCode> {
        let mut seen = HashSet::new();
        let mut result: Vec<&SecondaryCode> = self
            .tables
            .primary_secondary
            .iter()
            .filter(|x| pattern_matches(&x.primary, primary))
            .filter_map(|x| self.secondary(&x.secondary))
            .filter(|s| seen.insert(s.code.as_str()))
            .collect();

        result.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.description.cmp(&b.description))
        });
        result
    }

    /// Secondary codes offered for a habitat type, mandatory ones first.
    pub fn secondaries_for_habitat_type(&self, habitat_type: &str) -> Vec<HabitatTypeSecondary<'_>> {
        let mut result: Vec<HabitatTypeSecondary<'_>> = self
            .tables
            .habitat_type_secondary
            .iter()
            .filter(|x| x.habitat_type == habitat_type)
            .filter_map(|x| {
                self.secondary(&x.secondary).map(|secondary| HabitatTypeSecondary {
                    secondary,
                    mandatory: x.mandatory,
                    preferred: x.preferred,
                })
            })
            .collect();
        // Stable, so lookup order survives within each flag
        result.sort_by_key(|s| !s.mandatory);
        result
    }

    pub fn secondary_group(&self, code: &str) -> Option<&SecondaryGroup> {
        self.group_by_code
            .get(code)
            .map(|&i| &self.tables.secondary_groups[i])
    }

    /// Sort order of a secondary group; unknown groups sort last.
    pub fn secondary_group_order(&self, group: &str) -> i32 {
        self.secondary_group(group)
            .map(|g| g.sort_order)
            .unwrap_or(i32::MAX)
    }

    /// Numeric sort key of a secondary code; unknown codes sort last.
    pub fn secondary_sort_key(&self, code: &str) -> i32 {
        self.secondary(code).map(|s| s.sort_order).unwrap_or(i32::MAX)
    }

    // ---------------------------------------------------------------------
    // Priority habitats
    // ---------------------------------------------------------------------

    pub fn priority_habitat(&self, code: &str) -> Option<&PriorityHabitatCode> {
        self.priority_by_code
            .get(code)
            .map(|&i| &self.tables.priority_habitats[i])
    }

    pub fn is_priority_habitat(&self, code: &str) -> bool {
        self.priority_by_code.contains_key(code)
    }

    /// Priority habitats mandated by a primary code. Exact match only.
    pub fn priority_habitats_for_primary(&self, primary: &str) -> Vec<&str> {
        self.tables
            .primary_priority
            .iter()
            .filter(|x| x.primary == primary)
            .map(|x| x.priority_habitat.as_str())
            .collect()
    }

    /// Priority habitats mandated by a secondary code.
    pub fn priority_habitats_for_secondary(&self, secondary: &str) -> Vec<&str> {
        self.tables
            .secondary_priority
            .iter()
            .filter(|x| x.secondary == secondary)
            .map(|x| x.priority_habitat.as_str())
            .collect()
    }

    // ---------------------------------------------------------------------
    // Code lists used by validation
    // ---------------------------------------------------------------------

    pub fn is_condition(&self, code: &str) -> bool {
        contains_code(&self.tables.conditions, code)
    }

    pub fn is_condition_qualifier(&self, code: &str) -> bool {
        contains_code(&self.tables.condition_qualifiers, code)
    }

    pub fn is_determination_quality(&self, code: &str) -> bool {
        contains_code(&self.tables.determination_qualities, code)
    }

    pub fn is_interpretation_quality(&self, code: &str) -> bool {
        contains_code(&self.tables.interpretation_qualities, code)
    }

    pub fn source_name(&self, id: i32) -> Option<&SourceName> {
        self.source_by_id.get(&id).map(|&i| &self.tables.sources[i])
    }

    pub fn is_habitat_class(&self, code: &str) -> bool {
        contains_code(&self.tables.habitat_classes, code)
    }

    /// Check that a source habitat type belongs to the given class.
    pub fn is_habitat_type_for_class(&self, habitat_type: &str, habitat_class: &str) -> bool {
        self.tables
            .source_habitat_types
            .iter()
            .any(|t| t.code == habitat_type && t.habitat_class == habitat_class)
    }

    pub fn is_importance(&self, code: &str) -> bool {
        contains_code(&self.tables.importances, code)
    }
}
