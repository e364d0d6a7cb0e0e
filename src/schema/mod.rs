//! Unit property schemas and correction
//!
//! - `registry`: static per-type schema records
//! - `corrector`: the property correction pipeline built on them

mod corrector;
mod registry;

pub use corrector::{check_expression, Correction, ExternalReference, PropertyCorrector};
pub use registry::{schema_for, Dynamic, Requirement, SchemaRecord, UnitKind};
