//! Dirty-state tracking.
//!
//! Compares the live incid against a snapshot taken when it was loaded. An
//! aggregate is dirty when its record count changed or when any of its
//! records was added by the user or was persisted and has since changed.
//! Records that were persisted and are untouched never count, even if they
//! fail validation. Neither do placeholders the engine derived and nobody
//! has filled in yet.

use serde::Serialize;

use crate::types::*;

/// A record whose changes are tracked against its loaded state.
pub trait TrackedRecord {
    /// Durable id, or [`TRANSIENT_ID`] for records added since load
    fn record_id(&self) -> i64;

    /// Compare persisted fields only; derived flags are ignored.
    fn same_fields(&self, other: &Self) -> bool;

    /// Created by the engine rather than the user, and still untouched
    fn is_derived_placeholder(&self) -> bool {
        false
    }
}

impl TrackedRecord for SecondaryHabitat {
    fn record_id(&self) -> i64 {
        self.persisted_id
    }

    fn same_fields(&self, other: &Self) -> bool {
        self.incid == other.incid && self.code == other.code && self.group == other.group
    }
}

impl TrackedRecord for PriorityHabitat {
    fn record_id(&self) -> i64 {
        self.persisted_id
    }

    fn same_fields(&self, other: &Self) -> bool {
        self.incid == other.incid
            && self.habitat_code == other.habitat_code
            && self.determination_quality == other.determination_quality
            && self.interpretation_quality == other.interpretation_quality
            && self.interpretation_comments == other.interpretation_comments
    }

    fn is_derived_placeholder(&self) -> bool {
        self.is_untouched_placeholder()
    }
}

impl TrackedRecord for Condition {
    fn record_id(&self) -> i64 {
        self.persisted_id
    }

    fn same_fields(&self, other: &Self) -> bool {
        self == other
    }
}

impl TrackedRecord for SourceSlot {
    fn record_id(&self) -> i64 {
        self.persisted_id
    }

    fn same_fields(&self, other: &Self) -> bool {
        self == other
    }
}

impl TrackedRecord for MultiplexRow {
    fn record_id(&self) -> i64 {
        self.persisted_id
    }

    fn same_fields(&self, other: &Self) -> bool {
        self == other
    }
}

/// Whether one live record counts toward dirtiness.
fn record_dirty<T: TrackedRecord>(record: &T, original: &[T]) -> bool {
    if record.record_id() == TRANSIENT_ID {
        return true;
    }
    match original.iter().find(|o| o.record_id() == record.record_id()) {
        Some(loaded) => !record.same_fields(loaded),
        None => true,
    }
}

/// Compare a live collection with the collection it was loaded as.
pub fn collection_dirty<T: TrackedRecord>(live: &[T], original: &[T]) -> bool {
    let counted = |rows: &[T]| rows.iter().filter(|r| !r.is_derived_placeholder()).count();
    counted(live) != counted(original)
        || live
            .iter()
            .filter(|r| !r.is_derived_placeholder())
            .any(|r| record_dirty(r, original))
}

/// Per-aggregate dirty flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirtyState {
    /// Scalar fields of the incid itself
    pub incid: bool,
    pub secondaries: bool,
    pub priority_habitats: bool,
    pub condition: bool,
    pub sources: bool,
    pub matrix: bool,
    pub formation: bool,
    pub management: bool,
}

impl DirtyState {
    /// True if anything changed.
    pub fn is_dirty(&self) -> bool {
        self.incid
            || self.secondaries
            || self.priority_habitats
            || self.condition
            || self.sources
            || self.matrix
            || self.formation
            || self.management
    }

    /// Names of the changed aggregates.
    pub fn changed_aggregates(&self) -> Vec<&'static str> {
        [
            ("incid", self.incid),
            ("secondaries", self.secondaries),
            ("priority_habitats", self.priority_habitats),
            ("condition", self.condition),
            ("sources", self.sources),
            ("matrix", self.matrix),
            ("formation", self.formation),
            ("management", self.management),
        ]
        .into_iter()
        .filter(|(_, dirty)| *dirty)
        .map(|(name, _)| name)
        .collect()
    }
}

/// The incid as it was loaded.
#[derive(Debug, Clone)]
pub struct IncidSnapshot {
    incid: Incid,
}

impl IncidSnapshot {
    pub fn capture(incid: &Incid) -> Self {
        Self {
            incid: incid.clone(),
        }
    }

    pub fn incid(&self) -> &Incid {
        &self.incid
    }
}

/// Compares live state with the loaded snapshot.
pub struct DirtyStateTracker {
    original: IncidSnapshot,
}

impl DirtyStateTracker {
    pub fn new(loaded: &Incid) -> Self {
        Self {
            original: IncidSnapshot::capture(loaded),
        }
    }

    /// Take a fresh snapshot, e.g. after a save or reload.
    pub fn reset(&mut self, loaded: &Incid) {
        self.original = IncidSnapshot::capture(loaded);
    }

    pub fn original(&self) -> &IncidSnapshot {
        &self.original
    }

    /// Evaluate every aggregate of `live` against the snapshot.
    pub fn evaluate(&self, live: &Incid) -> DirtyState {
        let original = &self.original.incid;

        DirtyState {
            incid: !live.header_eq(original),
            secondaries: collection_dirty(&live.secondaries, &original.secondaries),
            priority_habitats: collection_dirty(
                &live.priority_habitats(),
                &original.priority_habitats(),
            ),
            condition: collection_dirty(
                live.condition.as_slice(),
                original.condition.as_slice(),
            ),
            sources: Self::sources_dirty(&live.sources, &original.sources),
            matrix: collection_dirty(&live.matrix, &original.matrix),
            formation: collection_dirty(&live.formation, &original.formation),
            management: collection_dirty(&live.management, &original.management),
        }
    }

    /// Sources are compared slot by slot; moving a source between slots counts.
    fn sources_dirty(
        live: &[Option<SourceSlot>; SOURCE_SLOTS],
        original: &[Option<SourceSlot>; SOURCE_SLOTS],
    ) -> bool {
        live.iter().zip(original.iter()).any(|(l, o)| match (l, o) {
            (None, None) => false,
            (Some(l), Some(o)) => record_dirty(l, std::slice::from_ref(o)),
            _ => true,
        })
    }
}
