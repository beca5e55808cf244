//! Secondary habitat collection.
//!
//! An ordered set of secondary habitat entries for one incid. Every mutation
//! re-sorts the collection per its [`OrderPolicy`] and recomputes validity;
//! mutating calls report whether anything changed so the caller can cascade
//! into priority habitat reconciliation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use classification::ClassificationLookup;

use crate::config::{OrderPolicy, SecondaryConfig};
use crate::primary::PrimaryDerivation;
use crate::types::{SecondaryHabitat, Warning, WarningField};

/// Ordered, mutable collection of secondary habitats.
pub struct SecondaryHabitatCollection {
    lookup: Arc<ClassificationLookup>,
    /// Owning incid key, stamped on every entry
    incid: String,
    items: Vec<SecondaryHabitat>,
    order: OrderPolicy,
    /// Validate against the primary's valid set rather than all known codes
    valid_for_primary: bool,
    /// Primary the collection was last validated against
    primary: Option<String>,
    valid_codes: HashSet<String>,
    has_invalid: bool,
}

impl SecondaryHabitatCollection {
    pub fn new(lookup: Arc<ClassificationLookup>, incid: impl Into<String>, config: &SecondaryConfig) -> Self {
        Self {
            lookup,
            incid: incid.into(),
            items: Vec::new(),
            order: config.order,
            valid_for_primary: config.codes_valid_for_primary,
            primary: None,
            valid_codes: HashSet::new(),
            has_invalid: false,
        }
    }

    /// Replace the contents with loaded entries without reporting a change.
    pub fn load(&mut self, incid: impl Into<String>, items: Vec<SecondaryHabitat>) {
        self.incid = incid.into();
        self.items = items;
        self.prepare_items();
        self.sort();
        self.recompute_validity();
    }

    /// Append a new entry.
    ///
    /// Returns false (and changes nothing) for a blank code or a code that is
    /// already present.
    pub fn add(&mut self, code: &str, group: &str) -> bool {
        let code = code.trim();
        if code.is_empty() || self.contains(code) {
            debug!(code = %code, "Secondary add ignored");
            return false;
        }

        let mut entry = SecondaryHabitat::new(self.incid.clone(), code, group);
        entry.sort_key = self.lookup.secondary_sort_key(code);
        self.items.push(entry);
        self.sort();
        self.recompute_validity();
        true
    }

    /// Remove an entry, matched by persisted id or, for transient entries, by code.
    pub fn remove(&mut self, entry: &SecondaryHabitat) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !Self::same_entry(item, entry));
        if self.items.len() == before {
            return false;
        }
        self.recompute_validity();
        true
    }

    /// Replace the whole collection (bulk paste).
    ///
    /// Duplicate codes in `items` keep their first occurrence. Returns whether
    /// the resulting collection differs from the current one.
    pub fn replace(&mut self, items: Vec<SecondaryHabitat>) -> bool {
        let mut seen = HashSet::new();
        let mut items: Vec<SecondaryHabitat> = items
            .into_iter()
            .filter(|item| seen.insert(item.code.clone()))
            .collect();
        std::mem::swap(&mut self.items, &mut items);
        self.prepare_items();
        self.sort();
        self.recompute_validity();

        let changed = !Self::same_entries(&items, &self.items);
        debug!(count = self.items.len(), changed, "Secondaries replaced");
        changed
    }

    /// Change the display order. Returns whether the order changed.
    pub fn set_order(&mut self, order: OrderPolicy) -> bool {
        if self.order == order {
            return false;
        }
        let before: Vec<String> = self.codes();
        self.order = order;
        self.sort();
        before != self.codes()
    }

    /// Revalidate every entry against a new primary derivation.
    ///
    /// Entries are never removed; only their validity flag changes.
    pub fn revalidate(&mut self, derivation: &PrimaryDerivation) {
        self.primary = derivation.primary.clone();
        self.valid_codes = derivation.valid_secondaries.iter().cloned().collect();
        self.recompute_validity();
    }

    fn recompute_validity(&mut self) {
        let valid_for_primary = self.valid_for_primary;
        for item in &mut self.items {
            item.is_valid = if valid_for_primary {
                self.valid_codes.contains(&item.code)
            } else {
                self.lookup.is_known_secondary(&item.code)
            };
        }
        self.has_invalid = self.items.iter().any(|i| !i.is_valid);
    }

    fn prepare_items(&mut self) {
        for item in &mut self.items {
            item.incid = self.incid.clone();
            item.sort_key = self.lookup.secondary_sort_key(&item.code);
        }
    }

    fn sort(&mut self) {
        let lookup = &self.lookup;
        match self.order {
            OrderPolicy::AsEntered => self
                .items
                .sort_by_key(|i| if i.is_transient() { i64::MAX } else { i.persisted_id }),
            OrderPolicy::ByGroupThenCode => self.items.sort_by(|a, b| {
                lookup
                    .secondary_group_order(&a.group)
                    .cmp(&lookup.secondary_group_order(&b.group))
                    .then_with(|| a.group.cmp(&b.group))
                    .then_with(|| a.sort_key.cmp(&b.sort_key))
                    .then_with(|| a.code.cmp(&b.code))
            }),
            OrderPolicy::ByCode => self
                .items
                .sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.code.cmp(&b.code))),
        }
    }

    fn same_entry(a: &SecondaryHabitat, b: &SecondaryHabitat) -> bool {
        if a.is_transient() || b.is_transient() {
            a.is_transient() == b.is_transient() && a.code == b.code
        } else {
            a.persisted_id == b.persisted_id
        }
    }

    fn same_entries(a: &[SecondaryHabitat], b: &[SecondaryHabitat]) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| {
                x.persisted_id == y.persisted_id && x.code == y.code && x.group == y.group
            })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.items.iter().any(|i| i.code == code)
    }

    pub fn items(&self) -> &[SecondaryHabitat] {
        &self.items
    }

    /// Codes in display order.
    pub fn codes(&self) -> Vec<String> {
        self.items.iter().map(|i| i.code.clone()).collect()
    }

    pub fn order(&self) -> OrderPolicy {
        self.order
    }

    pub fn has_invalid(&self) -> bool {
        self.has_invalid
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One warning per invalid entry.
    pub fn warnings(&self) -> Vec<Warning> {
        self.items
            .iter()
            .filter(|i| !i.is_valid)
            .map(|i| {
                let message = match (self.valid_for_primary, self.primary.as_deref()) {
                    (true, Some(primary)) => {
                        format!("Secondary code {} is not valid for primary {}", i.code, primary)
                    }
                    (true, None) => {
                        format!("Secondary code {} is not valid without a primary", i.code)
                    }
                    (false, _) => format!("Secondary code {} is not a known code", i.code),
                };
                Warning {
                    field: WarningField::Secondary { code: i.code.clone() },
                    message,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> Arc<ClassificationLookup> {
        let yaml = r#"
secondary_groups:
  - code: g1
    description: Features
    sort_order: 2
  - code: g2
    description: Management
    sort_order: 1
secondary_codes:
  - code: s1
    group: g1
    description: One
    sort_order: 3
  - code: s2
    group: g1
    description: Two
    sort_order: 1
  - code: s3
    group: g2
    description: Three
    sort_order: 2
"#;
        Arc::new(ClassificationLookup::from_yaml_str(yaml).unwrap())
    }

    fn derivation(valid: &[&str]) -> PrimaryDerivation {
        PrimaryDerivation {
            primary: Some("A1.1".to_string()),
            valid_secondaries: valid.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn collection(order: OrderPolicy) -> SecondaryHabitatCollection {
        let config = SecondaryConfig {
            order,
            ..Default::default()
        };
        SecondaryHabitatCollection::new(lookup(), "HLU/1", &config)
    }

    #[test]
    fn test_add_rejects_duplicates_and_blank() {
        let mut c = collection(OrderPolicy::AsEntered);
        assert!(c.add("s1", "g1"));
        assert!(!c.add("s1", "g1"));
        assert!(!c.add("  ", "g1"));
        assert_eq!(c.len(), 1);
        assert_eq!(c.items()[0].persisted_id, -1);
        assert_eq!(c.items()[0].incid, "HLU/1");
    }

    #[test]
    fn test_as_entered_order() {
        let mut c = collection(OrderPolicy::AsEntered);
        c.load(
            "HLU/1",
            vec![
                SecondaryHabitat::new("HLU/1", "s3", "g2").with_id(9),
                SecondaryHabitat::new("HLU/1", "s1", "g1").with_id(4),
            ],
        );
        c.add("s2", "g1");
        assert_eq!(c.codes(), vec!["s1", "s3", "s2"]);
    }

    #[test]
    fn test_group_then_code_order() {
        let mut c = collection(OrderPolicy::ByGroupThenCode);
        c.add("s1", "g1");
        c.add("s2", "g1");
        c.add("s3", "g2");
        assert_eq!(c.codes(), vec!["s3", "s2", "s1"]);

        assert!(c.set_order(OrderPolicy::ByCode));
        assert_eq!(c.codes(), vec!["s2", "s3", "s1"]);
    }

    #[test]
    fn test_revalidate_flags_but_keeps_entries() {
        let mut c = collection(OrderPolicy::AsEntered);
        c.add("s1", "g1");
        c.add("s2", "g1");
        c.revalidate(&derivation(&["s1", "s2"]));
        assert!(!c.has_invalid());

        c.revalidate(&derivation(&["s1"]));
        assert!(c.has_invalid());
        assert_eq!(c.len(), 2);
        let warnings = c.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, WarningField::Secondary { code: "s2".to_string() });
    }

    #[test]
    fn test_known_code_mode() {
        let config = SecondaryConfig {
            codes_valid_for_primary: false,
            ..Default::default()
        };
        let mut c = SecondaryHabitatCollection::new(lookup(), "HLU/1", &config);
        c.add("s1", "g1");
        c.add("zz", "g9");
        c.revalidate(&derivation(&[]));
        assert!(c.items()[0].is_valid);
        assert!(!c.items()[1].is_valid);
    }

    #[test]
    fn test_remove_and_replace() {
        let mut c = collection(OrderPolicy::AsEntered);
        c.load("HLU/1", vec![SecondaryHabitat::new("HLU/1", "s1", "g1").with_id(4)]);
        c.add("s2", "g1");

        let transient = SecondaryHabitat::new("HLU/1", "s2", "g1");
        assert!(c.remove(&transient));
        assert!(!c.remove(&transient));

        let same = vec![SecondaryHabitat::new("other", "s1", "g1").with_id(4)];
        assert!(!c.replace(same));
        assert_eq!(c.items()[0].incid, "HLU/1");

        let pasted = vec![
            SecondaryHabitat::new("HLU/1", "s3", "g2"),
            SecondaryHabitat::new("HLU/1", "s3", "g2"),
        ];
        assert!(c.replace(pasted));
        assert_eq!(c.codes(), vec!["s3"]);
    }
}
