//! Primary habitat selection.
//!
//! Choosing a primary code derives its category, an NVC hint, and the set of
//! secondary codes that are valid alongside it. A missing category row is a
//! data-integrity fault: it is logged and reported as a warning, and the
//! derivation continues with an empty category.

use std::sync::Arc;

use tracing::{debug, warn};

use classification::ClassificationLookup;

use crate::types::{Warning, WarningField};

/// Everything derived from a primary code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryDerivation {
    pub primary: Option<String>,
    pub category: Option<String>,
    pub nvc_codes: Option<String>,
    /// Secondary codes valid for the primary, in (sort order, description) order
    pub valid_secondaries: Vec<String>,
    /// Data-integrity faults found while deriving
    pub faults: Vec<Warning>,
}

impl PrimaryDerivation {
    pub fn is_valid_secondary(&self, code: &str) -> bool {
        self.valid_secondaries.iter().any(|c| c == code)
    }
}

/// A secondary code suggested by the selected habitat type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedSecondary {
    pub code: String,
    pub group: String,
    pub mandatory: bool,
}

/// Derives primary-dependent state and tracks the secondary group selection.
pub struct PrimaryHabitatSelector {
    lookup: Arc<ClassificationLookup>,
    /// Group reset to on every primary change
    preferred_group: Option<String>,
    /// Habitat type scoping the primary index
    habitat_type: Option<String>,
    /// Current secondary group selection
    secondary_group: Option<String>,
    derivation: PrimaryDerivation,
}

impl PrimaryHabitatSelector {
    pub fn new(lookup: Arc<ClassificationLookup>, preferred_group: Option<String>) -> Self {
        Self {
            lookup,
            preferred_group,
            habitat_type: None,
            secondary_group: None,
            derivation: PrimaryDerivation::default(),
        }
    }

    /// Select a primary code and derive its dependent state.
    ///
    /// Resets the secondary group to the preferred group, or clears it when
    /// the primary is cleared. Callers revalidate secondaries against the
    /// returned derivation.
    pub fn set_primary(&mut self, code: Option<&str>) -> &PrimaryDerivation {
        let code = code.map(str::trim).filter(|c| !c.is_empty());

        let Some(code) = code else {
            self.derivation = PrimaryDerivation::default();
            self.secondary_group = None;
            debug!("Primary cleared");
            return &self.derivation;
        };

        let mut faults = Vec::new();
        let category = match self.lookup.primary_category_of(code) {
            Ok(category) => Some(category.code.clone()),
            Err(e) => {
                warn!(primary = %code, error = %e, "Primary category lookup failed");
                faults.push(Warning::data_fault(WarningField::Primary, &e));
                None
            }
        };

        let nvc_codes = self
            .lookup
            .primary_scope(self.habitat_type.as_deref())
            .into_iter()
            .find(|p| p.code == code)
            .and_then(|p| p.nvc_codes.clone());

        let valid_secondaries: Vec<String> = self
            .lookup
            .secondaries_for(code)
            .into_iter()
            .map(|s| s.code.clone())
            .collect();

        debug!(
            primary = %code,
            valid_secondaries = valid_secondaries.len(),
            "Primary derived"
        );

        self.secondary_group = self.preferred_group.clone();
        self.derivation = PrimaryDerivation {
            primary: Some(code.to_string()),
            category,
            nvc_codes,
            valid_secondaries,
            faults,
        };
        &self.derivation
    }

    /// Select a habitat type, rescoping the primary index.
    ///
    /// The NVC hint of the current primary is rederived against the new scope.
    pub fn set_habitat_type(&mut self, habitat_type: Option<&str>) -> &PrimaryDerivation {
        self.habitat_type = habitat_type.map(str::to_string);
        let primary = self.derivation.primary.clone();
        let group = self.secondary_group.clone();
        self.set_primary(primary.as_deref());
        // Rescoping is not a primary change; keep the user's group choice
        self.secondary_group = group;
        &self.derivation
    }

    /// Primary codes offered under the current habitat type.
    pub fn scoped_primaries(&self) -> Vec<String> {
        self.lookup
            .primary_scope(self.habitat_type.as_deref())
            .into_iter()
            .map(|p| p.code.clone())
            .collect()
    }

    /// Secondary codes suggested by the current habitat type, mandatory first.
    pub fn suggested_secondaries(&self) -> Vec<SuggestedSecondary> {
        let Some(habitat_type) = self.habitat_type.as_deref() else {
            return Vec::new();
        };
        self.lookup
            .secondaries_for_habitat_type(habitat_type)
            .into_iter()
            .map(|s| SuggestedSecondary {
                code: s.secondary.code.clone(),
                group: s.secondary.group.clone(),
                mandatory: s.mandatory,
            })
            .collect()
    }

    pub fn set_secondary_group(&mut self, group: Option<&str>) {
        self.secondary_group = group.map(str::to_string);
    }

    pub fn secondary_group(&self) -> Option<&str> {
        self.secondary_group.as_deref()
    }

    pub fn habitat_type(&self) -> Option<&str> {
        self.habitat_type.as_deref()
    }

    pub fn derivation(&self) -> &PrimaryDerivation {
        &self.derivation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> Arc<ClassificationLookup> {
        let yaml = r#"
primary_categories:
  - code: G
    description: Grassland
primary_codes:
  - code: A1.1
    category: G
    description: Acid grassland
    nvc_codes: U1
  - code: A2
    category: X
    description: Uncategorised
secondary_codes:
  - code: s1
    group: g1
    description: Bracken
    sort_order: 2
  - code: s2
    group: g2
    description: Anthills
    sort_order: 1
primary_secondary:
  - primary: "A1.1"
    secondary: s1
  - primary: "A*"
    secondary: s2
habitat_types:
  - code: HT1
    name: Upland
habitat_type_primary:
  - habitat_type: HT1
    primary: A2
habitat_type_secondary:
  - habitat_type: HT1
    secondary: s1
  - habitat_type: HT1
    secondary: s2
    mandatory: true
"#;
        Arc::new(ClassificationLookup::from_yaml_str(yaml).unwrap())
    }

    #[test]
    fn test_set_primary_derives() {
        let mut selector = PrimaryHabitatSelector::new(lookup(), Some("g1".to_string()));
        let derivation = selector.set_primary(Some("A1.1")).clone();

        assert_eq!(derivation.category.as_deref(), Some("G"));
        assert_eq!(derivation.nvc_codes.as_deref(), Some("U1"));
        assert_eq!(derivation.valid_secondaries, vec!["s2", "s1"]);
        assert!(derivation.faults.is_empty());
        assert_eq!(selector.secondary_group(), Some("g1"));
    }

    #[test]
    fn test_set_none_clears() {
        let mut selector = PrimaryHabitatSelector::new(lookup(), Some("g1".to_string()));
        selector.set_primary(Some("A1.1"));
        let derivation = selector.set_primary(None).clone();

        assert_eq!(derivation, PrimaryDerivation::default());
        assert_eq!(selector.secondary_group(), None);
    }

    #[test]
    fn test_missing_category_is_fault_not_error() {
        let mut selector = PrimaryHabitatSelector::new(lookup(), None);
        let derivation = selector.set_primary(Some("A2")).clone();

        assert!(derivation.category.is_none());
        assert_eq!(derivation.faults.len(), 1);
        assert_eq!(derivation.faults[0].field, WarningField::Primary);
        // Secondaries are still derived
        assert_eq!(derivation.valid_secondaries, vec!["s2"]);
    }

    #[test]
    fn test_habitat_type_scopes_nvc() {
        let mut selector = PrimaryHabitatSelector::new(lookup(), None);
        selector.set_primary(Some("A1.1"));
        selector.set_secondary_group(Some("g2"));

        // A1.1 is outside the HT1 scope, so no NVC hint
        let derivation = selector.set_habitat_type(Some("HT1")).clone();
        assert!(derivation.nvc_codes.is_none());
        assert_eq!(derivation.category.as_deref(), Some("G"));
        assert_eq!(selector.secondary_group(), Some("g2"));
        assert_eq!(selector.scoped_primaries(), vec!["A2"]);

        let suggested = selector.suggested_secondaries();
        assert_eq!(suggested[0].code, "s2");
        assert!(suggested[0].mandatory);
    }
}
