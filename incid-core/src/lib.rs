//! Derivation, reconciliation and validation engine for incid habitat records
//!
//! An incid carries one primary habitat, a set of secondary habitats and two
//! partitions of priority (BAP) habitats. Editing any of them cascades:
//!
//! - **Primary**: derives the category, an NVC hint and the secondary codes
//!   valid alongside it
//! - **Secondaries**: revalidated against the primary; never removed
//! - **Priority habitats**: the mandatory set is recomputed and merged with the
//!   existing rows, preserving their identity and quality fields
//!
//! # Key Components
//!
//! - [`IncidEditor`]: Session over one incid that runs the cascade
//! - [`PrimaryHabitatSelector`]: Primary-dependent derivation
//! - [`SecondaryHabitatCollection`]: Ordered secondary habitats with validity
//! - [`PriorityHabitatReconciler`]: Auto/User partition reconciliation
//! - [`DirtyStateTracker`]: Per-aggregate change detection against the loaded state
//! - [`FieldValidator`]: Condition and evidence source validation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use classification::ClassificationLookup;
//! use incid_core::{Change, IncidConfig, IncidEditor};
//!
//! let lookup = Arc::new(ClassificationLookup::from_path("lookup.yaml")?);
//! let mut editor = IncidEditor::new(lookup, IncidConfig::default())?;
//! editor.set_listener(|change: Change| println!("{change:?}"));
//! editor.load(incid);
//!
//! editor.set_primary(Some("A1.1"));
//! editor.add_secondary("s1", None);
//! if editor.can_save() {
//!     persist(editor.to_incid());
//! }
//! ```

pub mod config;
pub mod dirty;
pub mod editor;
pub mod notify;
pub mod primary;
pub mod priority;
pub mod secondary;
pub mod types;
pub mod validation;
pub mod vague_date;

// Re-export main types
pub use config::{IncidConfig, OrderPolicy, PriorityConfig, SecondaryConfig, SourceConfig};
pub use dirty::{DirtyState, DirtyStateTracker, IncidSnapshot, TrackedRecord};
pub use editor::{IncidEditor, MultiplexGroup};
pub use notify::{Change, ChangeListener, NoopListener, RecordingListener};
pub use primary::{PrimaryDerivation, PrimaryHabitatSelector, SuggestedSecondary};
pub use priority::{
    partitions_fingerprint, PartitionFlags, PriorityHabitatReconciler, ReconcileInput,
    Reconciliation,
};
pub use secondary::SecondaryHabitatCollection;
pub use types::*;
pub use validation::FieldValidator;
pub use vague_date::{VagueDate, VagueDateError, VagueDateType};
