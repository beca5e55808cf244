//! Priority habitat reconciliation.
//!
//! The priority (BAP) habitats of an incid fall into two partitions:
//!
//! - **Auto**: habitats mandated by the primary code (exact match) and by the
//!   secondary codes. Every mandatory code is always represented here, by an
//!   existing row if one carries the code, otherwise by a transient placeholder.
//! - **User**: every other row, added independently by the user.
//!
//! Reconciliation recomputes the mandatory set and merges it with the rows
//! already attached to the incid. Existing rows keep their identity and
//! quality fields; rows whose code leaves the mandatory set are demoted to
//! User rather than dropped, except placeholders nobody has filled in, which
//! simply disappear. Running it again on its own output yields the
//! same partitions.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use classification::ClassificationLookup;

use crate::config::PriorityConfig;
use crate::types::PriorityHabitat;

/// Inputs to one reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    /// Owning incid key, stamped on placeholders
    pub incid: &'a str,
    pub primary: Option<&'a str>,
    pub secondaries: &'a [String],
    /// Every non-deleted row currently attached to the incid
    pub persisted_rows: &'a [PriorityHabitat],
    /// User partition of the previous reconciliation; empty on first run
    pub previous_user: &'a [PriorityHabitat],
    pub bulk_mode: bool,
}

/// Validity and duplicate flags over both partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionFlags {
    pub auto_has_invalid: bool,
    pub user_has_invalid: bool,
    /// Codes present in both partitions
    pub duplicate_codes: Vec<String>,
    /// Whether the duplicate count exceeds the configured threshold
    pub has_duplicates: bool,
}

/// Result of a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Mandatory codes, primary-derived first, in lookup order
    pub mandatory: Vec<String>,
    pub auto: Vec<PriorityHabitat>,
    pub user: Vec<PriorityHabitat>,
    pub flags: PartitionFlags,
}

/// Deterministic fingerprint of two partitions.
///
/// Covers identity and every persisted field, plus the partition each row is in.
/// Strings are length-prefixed and optional fields tagged so that adjacent
/// fields cannot run into each other.
pub fn partitions_fingerprint(auto: &[PriorityHabitat], user: &[PriorityHabitat]) -> String {
    fn text(hasher: &mut Sha256, value: &str) {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    fn optional(hasher: &mut Sha256, value: Option<&str>) {
        match value {
            Some(v) => {
                hasher.update([1u8]);
                text(hasher, v);
            }
            None => hasher.update([0u8]),
        }
    }

    let mut hasher = Sha256::new();
    for (is_auto, row) in auto
        .iter()
        .map(|r| (true, r))
        .chain(user.iter().map(|r| (false, r)))
    {
        hasher.update([u8::from(is_auto)]);
        hasher.update(row.persisted_id.to_le_bytes());
        text(&mut hasher, &row.incid);
        text(&mut hasher, &row.habitat_code);
        optional(&mut hasher, row.determination_quality.as_deref());
        optional(&mut hasher, row.interpretation_quality.as_deref());
        optional(&mut hasher, row.interpretation_comments.as_deref());
    }
    hex::encode(hasher.finalize())
}

impl Reconciliation {
    pub fn fingerprint(&self) -> String {
        partitions_fingerprint(&self.auto, &self.user)
    }
}

/// Computes mandatory priority habitats and reconciles them with existing rows.
pub struct PriorityHabitatReconciler {
    lookup: Arc<ClassificationLookup>,
    config: PriorityConfig,
}

impl PriorityHabitatReconciler {
    pub fn new(lookup: Arc<ClassificationLookup>, config: PriorityConfig) -> Self {
        Self { lookup, config }
    }

    /// The mandatory code set for a primary and its secondaries.
    ///
    /// Primary-derived codes come first, then secondary-derived codes, each in
    /// lookup order; duplicates keep their first position.
    pub fn mandatory_set(&self, primary: Option<&str>, secondaries: &[String]) -> Vec<String> {
        let primary_bap = primary
            .map(|p| self.lookup.priority_habitats_for_primary(p))
            .unwrap_or_default();
        let secondary_bap = secondaries
            .iter()
            .flat_map(|s| self.lookup.priority_habitats_for_secondary(s));

        let mut seen = HashSet::new();
        primary_bap
            .into_iter()
            .chain(secondary_bap)
            .filter(|code| seen.insert(*code))
            .map(str::to_string)
            .collect()
    }

    /// Reconcile the mandatory set with the rows attached to the incid.
    pub fn reconcile(&self, input: &ReconcileInput<'_>) -> Reconciliation {
        let mandatory = self.mandatory_set(input.primary, input.secondaries);
        let wrap = |row: &PriorityHabitat, is_auto: bool| {
            let mut row = row.clone();
            row.is_auto = is_auto;
            row.bulk_update_mode = input.bulk_mode;
            row
        };

        if mandatory.is_empty() {
            // Nothing is mandatory: every existing row is demoted to User
            let mut auto = Vec::new();
            let mut user: Vec<PriorityHabitat> = input
                .persisted_rows
                .iter()
                .filter(|r| !r.is_untouched_placeholder())
                .map(|r| wrap(r, false))
                .collect();
            let flags = self.assess(&mut auto, &mut user);
            debug!(user = user.len(), "No mandatory priority habitats");
            return Reconciliation {
                mandatory,
                auto,
                user,
                flags,
            };
        }

        let in_mandatory = |row: &&PriorityHabitat| mandatory.iter().any(|m| *m == row.habitat_code);

        // Rows already classified Auto keep precedence over rows being promoted
        let prev_auto: Vec<&PriorityHabitat> = input
            .persisted_rows
            .iter()
            .filter(in_mandatory)
            .filter(|r| r.is_auto)
            .collect();
        let new_auto: Vec<&PriorityHabitat> = input
            .persisted_rows
            .iter()
            .filter(in_mandatory)
            .filter(|r| !prev_auto.iter().any(|p| std::ptr::eq(*p, *r)))
            .collect();
        let potential_auto: Vec<&str> = mandatory
            .iter()
            .filter(|m| {
                !input.persisted_rows.iter().any(|r| r.habitat_code == **m)
                    && !prev_auto.iter().any(|r| r.habitat_code == **m)
            })
            .map(String::as_str)
            .collect();

        let mut auto: Vec<PriorityHabitat> = Vec::with_capacity(mandatory.len());
        for code in &mandatory {
            let existing = prev_auto
                .iter()
                .chain(new_auto.iter())
                .find(|r| r.habitat_code == *code);
            match existing {
                Some(row) => auto.push(wrap(*row, true)),
                None => {
                    let mut placeholder = self.placeholder(input.incid, code, input.bulk_mode);
                    placeholder.is_auto = true;
                    auto.push(placeholder);
                }
            }
        }

        let auto_codes: HashSet<&str> = mandatory.iter().map(String::as_str).collect();

        let carried_user: Vec<PriorityHabitat> = input
            .previous_user
            .iter()
            .filter(|r| !auto_codes.contains(r.habitat_code.as_str()))
            .map(|r| wrap(r, false))
            .collect();
        let carried_codes: HashSet<&str> =
            carried_user.iter().map(|r| r.habitat_code.as_str()).collect();
        let newly_discovered: Vec<PriorityHabitat> = input
            .persisted_rows
            .iter()
            .filter(|r| {
                !auto_codes.contains(r.habitat_code.as_str())
                    && !carried_codes.contains(r.habitat_code.as_str())
                    && !r.is_untouched_placeholder()
            })
            .map(|r| wrap(r, false))
            .collect();

        debug!(
            mandatory = mandatory.len(),
            prev_auto = prev_auto.len(),
            promoted = new_auto.len(),
            placeholders = potential_auto.len(),
            carried_user = carried_user.len(),
            new_user = newly_discovered.len(),
            "Priority habitats reconciled"
        );

        let mut user = carried_user;
        user.extend(newly_discovered);

        let flags = self.assess(&mut auto, &mut user);
        Reconciliation {
            mandatory,
            auto,
            user,
            flags,
        }
    }

    /// A new row for `habitat_code`, carrying the bulk quality defaults in bulk mode.
    pub fn placeholder(&self, incid: &str, habitat_code: &str, bulk_mode: bool) -> PriorityHabitat {
        let mut row = PriorityHabitat::placeholder(incid, habitat_code);
        row.bulk_update_mode = bulk_mode;
        if bulk_mode {
            row.determination_quality = self.config.bulk_determination_quality.clone();
            row.interpretation_quality = self.config.bulk_interpretation_quality.clone();
        }
        row
    }

    /// Recompute every row's validity flag and the partition flags.
    ///
    /// Used after reconciliation and again whenever the user edits a row.
    pub fn assess(&self, auto: &mut [PriorityHabitat], user: &mut [PriorityHabitat]) -> PartitionFlags {
        for row in auto.iter_mut() {
            row.is_auto = true;
            row.is_valid = self.validate_row(row).is_empty();
        }
        for row in user.iter_mut() {
            row.is_auto = false;
            row.is_valid = self.validate_row(row).is_empty();
        }

        let duplicate_codes = Self::duplicate_codes(auto, user);
        // TODO: drop the default threshold to 0 once the data owners confirm any
        // cross-partition duplicate is an error
        let has_duplicates = duplicate_codes.len() > self.config.duplicate_threshold;
        if !duplicate_codes.is_empty() {
            debug!(
                duplicates = duplicate_codes.len(),
                has_duplicates, "Priority habitat codes in both partitions"
            );
        }

        PartitionFlags {
            auto_has_invalid: auto.iter().any(|r| !r.is_valid),
            user_has_invalid: user.iter().any(|r| !r.is_valid),
            duplicate_codes,
            has_duplicates,
        }
    }

    /// Codes present in both partitions, in Auto order.
    pub fn duplicate_codes(auto: &[PriorityHabitat], user: &[PriorityHabitat]) -> Vec<String> {
        let user_codes: HashSet<&str> = user.iter().map(|r| r.habitat_code.as_str()).collect();
        let mut seen = HashSet::new();
        auto.iter()
            .map(|r| r.habitat_code.as_str())
            .filter(|c| user_codes.contains(c) && seen.insert(*c))
            .map(str::to_string)
            .collect()
    }

    /// Record-level validation of one row. Empty when the row is valid.
    pub fn validate_row(&self, row: &PriorityHabitat) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.lookup.is_priority_habitat(&row.habitat_code) {
            errors.push(format!(
                "Priority habitat {} is not a known priority habitat",
                row.habitat_code
            ));
        }

        match row.determination_quality.as_deref() {
            None if !row.bulk_update_mode => {
                errors.push("Determination quality is required".to_string());
            }
            None => {}
            Some(q) => {
                if !self.lookup.is_determination_quality(q) {
                    errors.push(format!("Determination quality {q} is not a known code"));
                }
                if !row.is_auto && self.config.not_present_quality.as_deref() == Some(q) {
                    errors.push(format!(
                        "Determination quality {q} is only allowed for priority habitats derived from the primary or secondary habitats"
                    ));
                }
            }
        }

        match row.interpretation_quality.as_deref() {
            None if !row.bulk_update_mode => {
                errors.push("Interpretation quality is required".to_string());
            }
            None => {}
            Some(q) => {
                if !self.lookup.is_interpretation_quality(q) {
                    errors.push(format!("Interpretation quality {q} is not a known code"));
                }
            }
        }

        if let Some(comments) = row.interpretation_comments.as_deref() {
            if comments.chars().count() > self.config.max_comment_length {
                errors.push(format!(
                    "Interpretation comments cannot exceed {} characters",
                    self.config.max_comment_length
                ));
            }
        }

        errors
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> Arc<ClassificationLookup> {
        let yaml = r#"
primary_priority:
  - primary: A1.1
    priority_habitat: bap1
  - primary: "A1*"
    priority_habitat: bapW
secondary_priority:
  - secondary: s1
    priority_habitat: bap2
  - secondary: s2
    priority_habitat: bap1
  - secondary: s2
    priority_habitat: bap3
priority_habitats:
  - code: bap1
    description: One
  - code: bap2
    description: Two
  - code: bap3
    description: Three
  - code: bap9
    description: Nine
determination_qualities:
  - code: Q1
  - code: NP
interpretation_qualities:
  - code: I1
"#;
        Arc::new(ClassificationLookup::from_yaml_str(yaml).unwrap())
    }

    fn reconciler() -> PriorityHabitatReconciler {
        PriorityHabitatReconciler::new(lookup(), PriorityConfig::default())
    }

    fn codes(rows: &[PriorityHabitat]) -> Vec<&str> {
        rows.iter().map(|r| r.habitat_code.as_str()).collect()
    }

    fn input<'a>(
        primary: Option<&'a str>,
        secondaries: &'a [String],
        persisted_rows: &'a [PriorityHabitat],
        previous_user: &'a [PriorityHabitat],
    ) -> ReconcileInput<'a> {
        ReconcileInput {
            incid: "HLU/1",
            primary,
            secondaries,
            persisted_rows,
            previous_user,
            bulk_mode: false,
        }
    }

    #[test]
    fn test_mandatory_set_order_and_dedup() {
        let r = reconciler();
        let secondaries = vec!["s2".to_string(), "s1".to_string()];
        assert_eq!(
            r.mandatory_set(Some("A1.1"), &secondaries),
            vec!["bap1", "bap3", "bap2"]
        );
        // Exact match only on the primary table
        assert!(r.mandatory_set(Some("A1.2"), &[]).is_empty());
        assert!(r.mandatory_set(None, &[]).is_empty());
    }

    #[test]
    fn test_placeholders_when_nothing_persisted() {
        let r = reconciler();
        let secondaries = vec!["s1".to_string()];
        let out = r.reconcile(&input(Some("A1.1"), &secondaries, &[], &[]));

        assert_eq!(codes(&out.auto), vec!["bap1", "bap2"]);
        assert!(out.auto.iter().all(|r| r.persisted_id == -1 && r.is_auto));
        assert!(out.auto.iter().all(|r| r.incid == "HLU/1"));
        assert!(out.user.is_empty());
        // Placeholders have no quality yet
        assert!(out.flags.auto_has_invalid);
    }

    #[test]
    fn test_demotion_keeps_rows() {
        let r = reconciler();
        let rows = vec![
            PriorityHabitat::placeholder("HLU/1", "bap1").with_id(3).with_quality("Q1", "I1"),
            PriorityHabitat::placeholder("HLU/1", "bap9").with_id(4).with_quality("Q1", "I1"),
        ];
        let out = r.reconcile(&input(None, &[], &rows, &[]));

        assert!(out.auto.is_empty());
        assert_eq!(out.user.len(), 2);
        assert_eq!(out.user[0].persisted_id, 3);
        assert_eq!(out.user[0].determination_quality.as_deref(), Some("Q1"));
        assert!(!out.user[0].is_auto);
    }

    #[test]
    fn test_carried_user_preserved_verbatim() {
        let r = reconciler();
        let persisted = vec![PriorityHabitat::placeholder("HLU/1", "bap9").with_id(4).with_quality("Q1", "I1")];
        let mut edited = persisted.clone();
        edited[0].interpretation_comments = Some("edited".to_string());

        let out = r.reconcile(&input(Some("A1.1"), &[], &persisted, &edited));
        assert_eq!(codes(&out.user), vec!["bap9"]);
        assert_eq!(out.user[0].interpretation_comments.as_deref(), Some("edited"));
    }

    #[test]
    fn test_not_present_quality_only_for_auto() {
        let r = reconciler();
        let mut row = PriorityHabitat::placeholder("HLU/1", "bap9").with_quality("NP", "I1");
        assert_eq!(r.validate_row(&row).len(), 1);
        row.is_auto = true;
        assert!(r.validate_row(&row).is_empty());
    }

    #[test]
    fn test_bulk_mode_allows_unset_quality() {
        let r = reconciler();
        let mut row = PriorityHabitat::placeholder("HLU/1", "bap1");
        assert_eq!(r.validate_row(&row).len(), 2);
        row.bulk_update_mode = true;
        assert!(r.validate_row(&row).is_empty());
    }

    #[test]
    fn test_bulk_placeholders_take_configured_quality() {
        let config = PriorityConfig {
            bulk_determination_quality: Some("Q1".to_string()),
            ..Default::default()
        };
        let r = PriorityHabitatReconciler::new(lookup(), config);
        let out = r.reconcile(&ReconcileInput {
            bulk_mode: true,
            ..input(Some("A1.1"), &[], &[], &[])
        });

        assert_eq!(out.auto[0].determination_quality.as_deref(), Some("Q1"));
        assert!(out.auto[0].interpretation_quality.is_none());
        assert!(!out.flags.auto_has_invalid);

        let out = r.reconcile(&input(Some("A1.1"), &[], &[], &[]));
        assert!(out.auto[0].determination_quality.is_none());
    }

    #[test]
    fn test_comment_length() {
        let r = reconciler();
        let mut row = PriorityHabitat::placeholder("HLU/1", "bap1").with_quality("Q1", "I1");
        row.interpretation_comments = Some("x".repeat(254));
        assert!(r.validate_row(&row).is_empty());
        row.interpretation_comments = Some("x".repeat(255));
        assert_eq!(r.validate_row(&row).len(), 1);
    }

    #[test]
    fn test_fingerprint_tracks_partition_and_fields() {
        let a = vec![PriorityHabitat::placeholder("HLU/1", "bap1").with_id(1)];
        let fp = partitions_fingerprint(&a, &[]);
        assert_eq!(fp, partitions_fingerprint(&a, &[]));
        assert_ne!(fp, partitions_fingerprint(&[], &a));

        let mut b = a.clone();
        b[0].interpretation_quality = Some(String::new());
        assert_ne!(fp, partitions_fingerprint(&b, &[]));

        // The same text in a neighbouring field is a different row
        let mut c = a.clone();
        c[0].determination_quality = Some("Q1".to_string());
        let mut d = a.clone();
        d[0].interpretation_quality = Some("Q1".to_string());
        assert_ne!(partitions_fingerprint(&c, &[]), partitions_fingerprint(&d, &[]));

        let mut e = a.clone();
        e[0].incid = "HLU/1b".to_string();
        e[0].habitat_code = "ap1".to_string();
        assert_ne!(fp, partitions_fingerprint(&e, &[]));
    }
}
