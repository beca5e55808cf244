//! Habitat classification lookup graph.
//!
//! Reference tables used to derive and validate incid records:
//!
//! - **Primary codes** and their categories, optionally scoped by habitat type
//! - **Secondary codes** and groups, joined to primaries through a
//!   cross-reference whose primary side may be a prefix pattern (`A1*`)
//! - **Priority (BAP) habitats** mandated by primary codes (exact match) and by
//!   secondary codes
//! - Code lists for conditions, qualities, sources and importances
//!
//! The lookup is loaded once and never mutated; share it with `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use classification::ClassificationLookup;
//!
//! let lookup = ClassificationLookup::from_path("lookup.yaml")?;
//! let valid = lookup.secondaries_for("A1.1");
//! let mandatory = lookup.priority_habitats_for_primary("A1.1");
//! ```

pub mod loader;
pub mod lookup;
pub mod types;

pub use lookup::{ClassificationLookup, HabitatTypeSecondary, LookupError};
pub use types::*;
