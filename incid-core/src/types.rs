//! Core types for the incid data model.
//!
//! An [`Incid`] is loaded from persistence into these structures, mutated by
//! the editing components, and handed back on save. Fields marked
//! `#[serde(skip)]` are derived on every recompute and never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use classification::LookupError;

use crate::vague_date::{VagueDate, VagueDateError};

/// Identity of a record that has not been assigned a durable id yet.
pub const TRANSIENT_ID: i64 = -1;

/// Number of evidence source slots on every incid.
pub const SOURCE_SLOTS: usize = 3;

fn valid_by_default() -> bool {
    true
}

/// A habitat/land-use record and all of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incid {
    /// Unique incid code
    pub incid: String,
    /// Primary habitat code
    #[serde(default)]
    pub primary: Option<String>,
    /// Category derived from the primary code
    #[serde(skip)]
    pub category: Option<String>,
    /// NVC codes hint derived from the primary code
    #[serde(skip)]
    pub nvc_codes: Option<String>,
    /// Habitat type selection scoping the primary index
    #[serde(default)]
    pub habitat_type: Option<String>,
    /// Habitat code carried over from the legacy classification
    #[serde(default)]
    pub legacy_habitat: Option<String>,
    #[serde(default)]
    pub general_comments: Option<String>,
    #[serde(default)]
    pub site_ref: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub boundary_base_map: Option<String>,
    #[serde(default)]
    pub digitisation_base_map: Option<String>,
    /// At most one condition assessment
    #[serde(default)]
    pub condition: Option<Condition>,
    /// Exactly three evidence source slots, each independently empty
    #[serde(default)]
    pub sources: [Option<SourceSlot>; SOURCE_SLOTS],
    /// Secondary habitats in display order
    #[serde(default)]
    pub secondaries: Vec<SecondaryHabitat>,
    /// Priority habitats mandated by the primary/secondary codes
    #[serde(default)]
    pub priority_auto: Vec<PriorityHabitat>,
    /// Priority habitats added independently by the user
    #[serde(default)]
    pub priority_user: Vec<PriorityHabitat>,
    #[serde(default)]
    pub matrix: Vec<MultiplexRow>,
    #[serde(default)]
    pub formation: Vec<MultiplexRow>,
    #[serde(default)]
    pub management: Vec<MultiplexRow>,
}

impl Incid {
    /// Create an empty incid with the given key.
    pub fn new(incid: impl Into<String>) -> Self {
        Self {
            incid: incid.into(),
            primary: None,
            category: None,
            nvc_codes: None,
            habitat_type: None,
            legacy_habitat: None,
            general_comments: None,
            site_ref: None,
            site_name: None,
            boundary_base_map: None,
            digitisation_base_map: None,
            condition: None,
            sources: Default::default(),
            secondaries: Vec::new(),
            priority_auto: Vec::new(),
            priority_user: Vec::new(),
            matrix: Vec::new(),
            formation: Vec::new(),
            management: Vec::new(),
        }
    }

    /// Builder: set the primary code.
    pub fn with_primary(mut self, primary: impl Into<String>) -> Self {
        self.primary = Some(primary.into());
        self
    }

    /// Every priority habitat row, auto partition first.
    pub fn priority_habitats(&self) -> Vec<PriorityHabitat> {
        self.priority_auto
            .iter()
            .chain(self.priority_user.iter())
            .cloned()
            .collect()
    }

    /// Compare the persisted scalar fields of two incids.
    pub fn header_eq(&self, other: &Self) -> bool {
        self.incid == other.incid
            && self.primary == other.primary
            && self.legacy_habitat == other.legacy_habitat
            && self.general_comments == other.general_comments
            && self.site_ref == other.site_ref
            && self.site_name == other.site_name
            && self.boundary_base_map == other.boundary_base_map
            && self.digitisation_base_map == other.digitisation_base_map
    }
}

/// A secondary habitat entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryHabitat {
    /// Durable id, or [`TRANSIENT_ID`]
    pub persisted_id: i64,
    /// Owning incid key
    pub incid: String,
    pub code: String,
    pub group: String,
    /// Ordering key derived from the code
    #[serde(skip)]
    pub sort_key: i32,
    /// Whether the code is currently valid; recomputed, never stored
    #[serde(skip, default = "valid_by_default")]
    pub is_valid: bool,
}

impl SecondaryHabitat {
    /// Create a transient entry.
    pub fn new(incid: impl Into<String>, code: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            persisted_id: TRANSIENT_ID,
            incid: incid.into(),
            code: code.into(),
            group: group.into(),
            sort_key: i32::MAX,
            is_valid: true,
        }
    }

    /// Builder: give the entry a durable id.
    pub fn with_id(mut self, persisted_id: i64) -> Self {
        self.persisted_id = persisted_id;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.persisted_id == TRANSIENT_ID
    }
}

/// A priority (BAP) habitat assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityHabitat {
    /// Durable id, or [`TRANSIENT_ID`]
    pub persisted_id: i64,
    /// Owning incid key
    pub incid: String,
    pub habitat_code: String,
    #[serde(default)]
    pub determination_quality: Option<String>,
    #[serde(default)]
    pub interpretation_quality: Option<String>,
    #[serde(default)]
    pub interpretation_comments: Option<String>,
    /// Mandated by the primary/secondary codes; re-derived on every reconciliation
    #[serde(skip)]
    pub is_auto: bool,
    /// Whether the row is being edited under bulk update
    #[serde(skip)]
    pub bulk_update_mode: bool,
    #[serde(skip, default = "valid_by_default")]
    pub is_valid: bool,
}

impl PriorityHabitat {
    /// Create a transient placeholder with every quality field unset.
    pub fn placeholder(incid: impl Into<String>, habitat_code: impl Into<String>) -> Self {
        Self {
            persisted_id: TRANSIENT_ID,
            incid: incid.into(),
            habitat_code: habitat_code.into(),
            determination_quality: None,
            interpretation_quality: None,
            interpretation_comments: None,
            is_auto: false,
            bulk_update_mode: false,
            is_valid: true,
        }
    }

    /// Builder: give the row a durable id.
    pub fn with_id(mut self, persisted_id: i64) -> Self {
        self.persisted_id = persisted_id;
        self
    }

    /// Builder: set both quality codes.
    pub fn with_quality(
        mut self,
        determination: impl Into<String>,
        interpretation: impl Into<String>,
    ) -> Self {
        self.determination_quality = Some(determination.into());
        self.interpretation_quality = Some(interpretation.into());
        self
    }

    pub fn is_transient(&self) -> bool {
        self.persisted_id == TRANSIENT_ID
    }

    /// A derived placeholder that was never saved and carries no user input.
    ///
    /// Such rows exist only because their code is mandatory; they are dropped
    /// rather than demoted when it stops being mandatory, and do not make the
    /// incid dirty.
    pub fn is_untouched_placeholder(&self) -> bool {
        self.is_transient()
            && self.is_auto
            && self.determination_quality.is_none()
            && self.interpretation_quality.is_none()
            && self.interpretation_comments.is_none()
    }
}

/// A condition assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub persisted_id: i64,
    pub incid: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub qualifier: Option<String>,
    #[serde(default)]
    pub date: VagueDate,
}

impl Condition {
    pub fn new(incid: impl Into<String>) -> Self {
        Self {
            persisted_id: TRANSIENT_ID,
            incid: incid.into(),
            code: None,
            qualifier: None,
            date: VagueDate::default(),
        }
    }
}

/// One of the three evidence sources of an incid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSlot {
    pub persisted_id: i64,
    pub incid: String,
    #[serde(default)]
    pub source_id: Option<i32>,
    #[serde(default)]
    pub date: VagueDate,
    #[serde(default)]
    pub habitat_class: Option<String>,
    #[serde(default)]
    pub habitat_type: Option<String>,
    #[serde(default)]
    pub boundary_importance: Option<String>,
    #[serde(default)]
    pub habitat_importance: Option<String>,
}

impl SourceSlot {
    pub fn new(incid: impl Into<String>) -> Self {
        Self {
            persisted_id: TRANSIENT_ID,
            incid: incid.into(),
            source_id: None,
            date: VagueDate::default(),
            habitat_class: None,
            habitat_type: None,
            boundary_importance: None,
            habitat_importance: None,
        }
    }

    /// Read one importance field.
    pub fn importance(&self, kind: ImportanceKind) -> Option<&str> {
        match kind {
            ImportanceKind::Boundary => self.boundary_importance.as_deref(),
            ImportanceKind::Habitat => self.habitat_importance.as_deref(),
        }
    }
}

/// The two importance fields of a source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportanceKind {
    Boundary,
    Habitat,
}

impl ImportanceKind {
    pub fn field(&self) -> SourceField {
        match self {
            Self::Boundary => SourceField::BoundaryImportance,
            Self::Habitat => SourceField::HabitatImportance,
        }
    }
}

/// A row of one of the IHS multiplex groups (matrix, formation, management).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexRow {
    pub persisted_id: i64,
    pub incid: String,
    pub code: String,
}

/// Fields of a source slot that validation can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceField {
    SourceId,
    Date,
    HabitatClass,
    HabitatType,
    BoundaryImportance,
    HabitatImportance,
}

impl SourceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceId => "source_id",
            Self::Date => "date",
            Self::HabitatClass => "habitat_class",
            Self::HabitatType => "habitat_type",
            Self::BoundaryImportance => "boundary_importance",
            Self::HabitatImportance => "habitat_importance",
        }
    }

    /// Human-readable label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SourceId => "Source name",
            Self::Date => "Source date",
            Self::HabitatClass => "Habitat class",
            Self::HabitatType => "Habitat type",
            Self::BoundaryImportance => "Boundary importance",
            Self::HabitatImportance => "Habitat importance",
        }
    }
}

/// A field that validation can attach an error to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    ConditionCode,
    ConditionQualifier,
    ConditionDate,
    /// A field of source slot `slot` (0-based)
    Source { slot: usize, field: SourceField },
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConditionCode => write!(f, "condition"),
            Self::ConditionQualifier => write!(f, "condition_qualifier"),
            Self::ConditionDate => write!(f, "condition_date"),
            Self::Source { slot, field } => write!(f, "source{}_{}", slot + 1, field.as_str()),
        }
    }
}

/// A validation failure attached to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: FieldId,
    pub message: String,
}

impl FieldError {
    pub fn new(field: FieldId, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// What a warning is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningField {
    Primary,
    Secondary { code: String },
    PriorityHabitat { code: String },
}

/// A non-blocking problem surfaced to the host.
///
/// Data-integrity faults (a referenced lookup row is missing) and secondary
/// codes that are not valid for the current primary are reported this way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub field: WarningField,
    pub message: String,
}

impl Warning {
    pub fn data_fault(field: WarningField, error: &LookupError) -> Self {
        Self {
            field,
            message: error.to_string(),
        }
    }
}

/// Error types for the incid core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Lookup construction or query failed
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A vague date string could not be parsed
    #[error("Invalid vague date: {0}")]
    InvalidVagueDate(#[from] VagueDateError),

    /// A record referenced by the caller is not part of the incid
    #[error("Unknown record: {0}")]
    UnknownRecord(String),

    /// An internal invariant was broken
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
