//! Editing session over one incid.
//!
//! `IncidEditor` owns the live incid and wires the recompute cascade:
//!
//! ```text
//! set_primary ──► PrimaryHabitatSelector ──► SecondaryHabitatCollection::revalidate
//!                                                     │
//! add/remove/replace secondary ───────────────────────┤
//!                                                     ▼
//!                                   PriorityHabitatReconciler::reconcile
//!                                                     │
//!                                                     ▼
//!                                        ChangeListener (one per change)
//! ```
//!
//! Edits to individual priority habitat rows only re-assess validity; they
//! never reconcile, so a user row edited onto a mandatory code stays visible
//! as a duplicate until the next cascade.

use std::sync::Arc;

use tracing::{debug, info};

use classification::ClassificationLookup;

use crate::config::{IncidConfig, OrderPolicy};
use crate::dirty::{DirtyState, DirtyStateTracker};
use crate::notify::{Change, ChangeListener, NoopListener, Notifier};
use crate::primary::{PrimaryDerivation, PrimaryHabitatSelector};
use crate::priority::{
    partitions_fingerprint, PartitionFlags, PriorityHabitatReconciler, ReconcileInput,
};
use crate::secondary::SecondaryHabitatCollection;
use crate::types::*;
use crate::validation::FieldValidator;

/// One of the multiplex groups carried on every incid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexGroup {
    Matrix,
    Formation,
    Management,
}

/// Single-threaded editing session over one incid.
pub struct IncidEditor {
    lookup: Arc<ClassificationLookup>,
    config: IncidConfig,
    /// Live state; secondaries and priority partitions are kept in sync with
    /// the components below after every mutation
    incid: Incid,
    selector: PrimaryHabitatSelector,
    secondaries: SecondaryHabitatCollection,
    reconciler: PriorityHabitatReconciler,
    validator: FieldValidator,
    tracker: DirtyStateTracker,
    notifier: Notifier,
    flags: PartitionFlags,
    bulk_mode: bool,
    /// Fingerprint of the priority partitions last reported to the listener
    fingerprint: String,
}

impl IncidEditor {
    /// Create an editor over an empty incid. Call [`load`](Self::load) next.
    pub fn new(lookup: Arc<ClassificationLookup>, config: IncidConfig) -> Result<Self> {
        config.check()?;

        let incid = Incid::new("");
        Ok(Self {
            selector: PrimaryHabitatSelector::new(
                Arc::clone(&lookup),
                config.secondary.preferred_group.clone(),
            ),
            secondaries: SecondaryHabitatCollection::new(Arc::clone(&lookup), "", &config.secondary),
            reconciler: PriorityHabitatReconciler::new(Arc::clone(&lookup), config.priority.clone()),
            validator: FieldValidator::new(Arc::clone(&lookup), config.sources.clone()),
            tracker: DirtyStateTracker::new(&incid),
            notifier: Notifier::new(Box::new(NoopListener)),
            flags: PartitionFlags::default(),
            bulk_mode: false,
            fingerprint: partitions_fingerprint(&[], &[]),
            lookup,
            config,
            incid,
        })
    }

    /// Replace the change listener.
    pub fn set_listener(&mut self, listener: impl ChangeListener + 'static) {
        self.notifier.set_listener(Box::new(listener));
    }

    /// Load an incid as handed over by persistence.
    ///
    /// The dirty baseline is the incid exactly as given. Placeholders created
    /// for mandatory priority habitats only count as changes once they are
    /// filled in.
    pub fn load(&mut self, incid: Incid) {
        self.tracker.reset(&incid);
        self.incid = incid;

        self.selector = PrimaryHabitatSelector::new(
            Arc::clone(&self.lookup),
            self.config.secondary.preferred_group.clone(),
        );
        self.selector.set_habitat_type(self.incid.habitat_type.as_deref());
        let derivation = self.selector.set_primary(self.incid.primary.as_deref()).clone();
        self.apply_derivation(&derivation);

        let key = self.incid.incid.clone();
        self.secondaries.load(key, std::mem::take(&mut self.incid.secondaries));
        self.secondaries.revalidate(&derivation);
        self.sync_secondaries();

        // First run: nothing carried over from a previous reconciliation
        self.reconcile(false);
        self.fingerprint = self.current_fingerprint();

        info!(
            incid = %self.incid.incid,
            primary = ?self.incid.primary,
            secondaries = self.secondaries.len(),
            auto = self.incid.priority_auto.len(),
            user = self.incid.priority_user.len(),
            "Incid loaded"
        );
        self.notifier.notify(Change::Loaded);
    }

    /// Reload the same incid, typically after a save.
    pub fn reload(&mut self, incid: Incid) -> Result<()> {
        if incid.incid != self.incid.incid {
            return Err(CoreError::UnknownRecord(format!(
                "cannot reload {} into the session for {}",
                incid.incid, self.incid.incid
            )));
        }
        self.load(incid);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Primary and habitat type
    // ---------------------------------------------------------------------

    /// Select a habitat type, rescoping the primary index.
    pub fn set_habitat_type(&mut self, habitat_type: Option<&str>) -> bool {
        let habitat_type = habitat_type.map(str::trim).filter(|t| !t.is_empty());
        if habitat_type == self.incid.habitat_type.as_deref() {
            return false;
        }
        self.incid.habitat_type = habitat_type.map(str::to_string);

        let before = self.selector.derivation().clone();
        let derivation = self.selector.set_habitat_type(habitat_type).clone();
        self.apply_derivation(&derivation);

        self.notifier.notify(Change::HabitatType);
        if derivation != before {
            self.notifier.notify(Change::Primary);
        }
        true
    }

    /// Select the primary code and run the full cascade.
    ///
    /// Returns false when the primary is unchanged.
    pub fn set_primary(&mut self, primary: Option<&str>) -> bool {
        let primary = primary.map(str::trim).filter(|p| !p.is_empty());
        if primary == self.incid.primary.as_deref() {
            return false;
        }
        self.incid.primary = primary.map(str::to_string);
        debug!(incid = %self.incid.incid, primary = ?primary, "Primary changed");

        let derivation = self.selector.set_primary(primary).clone();
        self.apply_derivation(&derivation);
        self.notifier.notify(Change::Primary);
        self.notifier.notify(Change::SecondaryGroup);

        self.secondaries.revalidate(&derivation);
        self.sync_secondaries();
        self.notifier.notify(Change::Secondaries);

        self.reconcile(true);
        self.notify_if_priority_changed();
        true
    }

    pub fn set_secondary_group(&mut self, group: Option<&str>) {
        if group != self.selector.secondary_group() {
            self.selector.set_secondary_group(group);
            self.notifier.notify(Change::SecondaryGroup);
        }
    }

    // ---------------------------------------------------------------------
    // Secondary habitats
    // ---------------------------------------------------------------------

    /// Add a secondary code. Without a group, the code's own group is used.
    pub fn add_secondary(&mut self, code: &str, group: Option<&str>) -> bool {
        let group = group
            .map(str::to_string)
            .or_else(|| self.lookup.secondary(code.trim()).map(|s| s.group.clone()))
            .unwrap_or_default();
        if !self.secondaries.add(code, &group) {
            return false;
        }
        self.secondaries_changed();
        true
    }

    pub fn remove_secondary(&mut self, entry: &SecondaryHabitat) -> bool {
        if !self.secondaries.remove(entry) {
            return false;
        }
        self.secondaries_changed();
        true
    }

    /// Replace every secondary habitat at once (bulk paste).
    ///
    /// The listener sees at most one notification per kind of change, after
    /// the whole cascade has run.
    pub fn replace_secondaries(&mut self, items: Vec<SecondaryHabitat>) -> bool {
        self.notifier.suspend();
        let changed = self.secondaries.replace(items);
        if changed {
            self.secondaries_changed();
        }
        self.notifier.resume();
        changed
    }

    pub fn set_secondary_order(&mut self, order: OrderPolicy) -> bool {
        if !self.secondaries.set_order(order) {
            return false;
        }
        // Mandatory codes follow secondary order
        self.secondaries_changed();
        true
    }

    fn secondaries_changed(&mut self) {
        self.sync_secondaries();
        self.notifier.notify(Change::Secondaries);
        self.reconcile(true);
        self.notify_if_priority_changed();
    }

    // ---------------------------------------------------------------------
    // Priority habitats
    // ---------------------------------------------------------------------

    /// Add a user priority habitat. Blank codes and codes already in the
    /// User partition are rejected.
    pub fn add_user_priority_habitat(&mut self, habitat_code: &str) -> bool {
        let code = habitat_code.trim();
        if code.is_empty() || self.incid.priority_user.iter().any(|r| r.habitat_code == code) {
            return false;
        }
        let row = self.reconciler.placeholder(&self.incid.incid, code, self.bulk_mode);
        self.incid.priority_user.push(row);
        self.reassess();
        true
    }

    /// Edit one priority habitat row in place.
    ///
    /// Identity, ownership and partition cannot be changed; an auto row also
    /// keeps its habitat code.
    pub fn update_priority_habitat(
        &mut self,
        target: &PriorityHabitat,
        edit: impl FnOnce(&mut PriorityHabitat),
    ) -> Result<()> {
        let row = self
            .incid
            .priority_auto
            .iter_mut()
            .chain(self.incid.priority_user.iter_mut())
            .find(|r| Self::same_row(r, target))
            .ok_or_else(|| CoreError::UnknownRecord(format!("priority habitat {}", target.habitat_code)))?;

        let before = row.clone();
        edit(row);
        row.persisted_id = before.persisted_id;
        row.incid = before.incid;
        row.is_auto = before.is_auto;
        row.bulk_update_mode = before.bulk_update_mode;
        if before.is_auto {
            row.habitat_code = before.habitat_code;
        }

        self.reassess();
        Ok(())
    }

    /// Remove a user priority habitat.
    ///
    /// Returns `Ok(false)` for auto rows, which stay while their code is mandatory.
    pub fn remove_priority_habitat(&mut self, target: &PriorityHabitat) -> Result<bool> {
        if self.incid.priority_auto.iter().any(|r| Self::same_row(r, target)) {
            return Ok(false);
        }
        let before = self.incid.priority_user.len();
        self.incid.priority_user.retain(|r| !Self::same_row(r, target));
        if self.incid.priority_user.len() == before {
            return Err(CoreError::UnknownRecord(format!("priority habitat {}", target.habitat_code)));
        }
        self.reassess();
        Ok(true)
    }

    /// Switch bulk update mode, relaxing the required quality fields.
    pub fn set_bulk_mode(&mut self, bulk_mode: bool) {
        if self.bulk_mode == bulk_mode {
            return;
        }
        self.bulk_mode = bulk_mode;
        for row in self
            .incid
            .priority_auto
            .iter_mut()
            .chain(self.incid.priority_user.iter_mut())
        {
            row.bulk_update_mode = bulk_mode;
        }
        self.flags = self
            .reconciler
            .assess(&mut self.incid.priority_auto, &mut self.incid.priority_user);
        self.notifier.notify(Change::PriorityHabitats);
    }

    fn same_row(a: &PriorityHabitat, b: &PriorityHabitat) -> bool {
        if a.is_transient() || b.is_transient() {
            a.is_transient() == b.is_transient() && a.habitat_code == b.habitat_code
        } else {
            a.persisted_id == b.persisted_id
        }
    }

    // ---------------------------------------------------------------------
    // Condition, sources and other fields
    // ---------------------------------------------------------------------

    pub fn set_condition(&mut self, condition: Option<Condition>) {
        let key = self.incid.incid.clone();
        self.incid.condition = condition.map(|mut c| {
            c.incid = key;
            c
        });
        self.notifier.notify(Change::Condition);
    }

    /// Set or clear one of the three source slots (0-based).
    pub fn set_source(&mut self, slot: usize, source: Option<SourceSlot>) -> Result<()> {
        let key = self.incid.incid.clone();
        let target = self
            .incid
            .sources
            .get_mut(slot)
            .ok_or_else(|| CoreError::UnknownRecord(format!("source slot {slot}")))?;
        *target = source.map(|mut s| {
            s.incid = key;
            s
        });
        self.notifier.notify(Change::Sources);
        Ok(())
    }

    pub fn set_multiplex(&mut self, group: MultiplexGroup, rows: Vec<MultiplexRow>) {
        let target = match group {
            MultiplexGroup::Matrix => &mut self.incid.matrix,
            MultiplexGroup::Formation => &mut self.incid.formation,
            MultiplexGroup::Management => &mut self.incid.management,
        };
        *target = rows;
        self.notifier.notify(Change::Incid);
    }

    pub fn set_general_comments(&mut self, comments: Option<&str>) {
        self.incid.general_comments = comments.map(str::to_string);
        self.notifier.notify(Change::Incid);
    }

    pub fn set_site(&mut self, site_ref: Option<&str>, site_name: Option<&str>) {
        self.incid.site_ref = site_ref.map(str::to_string);
        self.incid.site_name = site_name.map(str::to_string);
        self.notifier.notify(Change::Incid);
    }

    // ---------------------------------------------------------------------
    // Recompute and results
    // ---------------------------------------------------------------------

    /// Run the whole cascade again without any edit.
    pub fn recompute(&mut self) {
        let derivation = self.selector.set_habitat_type(self.incid.habitat_type.as_deref()).clone();
        self.apply_derivation(&derivation);
        self.secondaries.revalidate(&derivation);
        self.sync_secondaries();
        self.reconcile(true);
        self.notify_if_priority_changed();
    }

    /// Reconcile the priority partitions with the current primary and secondaries.
    fn reconcile(&mut self, carry_user: bool) {
        let persisted = self.incid.priority_habitats();
        let previous_user = if carry_user {
            self.incid.priority_user.clone()
        } else {
            Vec::new()
        };
        let secondaries = self.secondaries.codes();

        let result = self.reconciler.reconcile(&ReconcileInput {
            incid: &self.incid.incid,
            primary: self.incid.primary.as_deref(),
            secondaries: &secondaries,
            persisted_rows: &persisted,
            previous_user: &previous_user,
            bulk_mode: self.bulk_mode,
        });

        self.incid.priority_auto = result.auto;
        self.incid.priority_user = result.user;
        self.flags = result.flags;
    }

    /// Re-assess validity after a row-level edit.
    fn reassess(&mut self) {
        self.flags = self
            .reconciler
            .assess(&mut self.incid.priority_auto, &mut self.incid.priority_user);
        self.notify_if_priority_changed();
    }

    fn notify_if_priority_changed(&mut self) {
        let fingerprint = self.current_fingerprint();
        if fingerprint != self.fingerprint {
            self.fingerprint = fingerprint;
            self.notifier.notify(Change::PriorityHabitats);
        }
    }

    fn current_fingerprint(&self) -> String {
        partitions_fingerprint(&self.incid.priority_auto, &self.incid.priority_user)
    }

    fn apply_derivation(&mut self, derivation: &PrimaryDerivation) {
        self.incid.category = derivation.category.clone();
        self.incid.nvc_codes = derivation.nvc_codes.clone();
    }

    fn sync_secondaries(&mut self) {
        self.incid.secondaries = self.secondaries.items().to_vec();
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.tracker.evaluate(&self.incid)
    }

    pub fn field_errors(&self) -> Vec<FieldError> {
        self.validator
            .validate(self.incid.condition.as_ref(), &self.incid.sources)
    }

    /// Every non-blocking problem: data faults, invalid secondaries, invalid
    /// priority habitat rows and cross-partition duplicates.
    pub fn warnings(&self) -> Vec<Warning> {
        let mut warnings = self.selector.derivation().faults.clone();
        warnings.extend(self.secondaries.warnings());

        for row in self
            .incid
            .priority_auto
            .iter()
            .chain(self.incid.priority_user.iter())
            .filter(|r| !r.is_valid)
        {
            warnings.push(Warning {
                field: WarningField::PriorityHabitat {
                    code: row.habitat_code.clone(),
                },
                message: self.reconciler.validate_row(row).join("; "),
            });
        }

        if self.flags.has_duplicates {
            for code in &self.flags.duplicate_codes {
                warnings.push(Warning {
                    field: WarningField::PriorityHabitat { code: code.clone() },
                    message: format!("Priority habitat {code} is both derived and added by the user"),
                });
            }
        }
        warnings
    }

    /// True when the incid has changes and nothing blocks saving them.
    pub fn can_save(&self) -> bool {
        let dirty = self.dirty_state();
        let ready = dirty.is_dirty()
            && !self.flags.auto_has_invalid
            && !self.flags.user_has_invalid
            && !self.flags.has_duplicates
            && self.field_errors().is_empty();
        debug!(
            incid = %self.incid.incid,
            dirty = ?dirty.changed_aggregates(),
            ready,
            "Save readiness"
        );
        ready
    }

    /// The live incid for hand-off to persistence.
    pub fn to_incid(&self) -> Incid {
        self.incid.clone()
    }

    pub fn incid(&self) -> &Incid {
        &self.incid
    }

    pub fn derivation(&self) -> &PrimaryDerivation {
        self.selector.derivation()
    }

    pub fn selector(&self) -> &PrimaryHabitatSelector {
        &self.selector
    }

    pub fn secondaries(&self) -> &SecondaryHabitatCollection {
        &self.secondaries
    }

    pub fn priority_auto(&self) -> &[PriorityHabitat] {
        &self.incid.priority_auto
    }

    pub fn priority_user(&self) -> &[PriorityHabitat] {
        &self.incid.priority_user
    }

    pub fn flags(&self) -> &PartitionFlags {
        &self.flags
    }

    pub fn bulk_mode(&self) -> bool {
        self.bulk_mode
    }

    pub fn config(&self) -> &IncidConfig {
        &self.config
    }
}
