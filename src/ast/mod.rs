//! AST Module - request model for assembly batches
//!
//! Contains the Rust types parsed from a YAML/JSON batch:
//! - `batch`: BatchRequest, ResourceDefinition, ServiceDef, UnitDef, LinkDef, Batch
//! - `properties`: PropertyMap and scalar-tolerant deserialization
//!
//! These types are the "what" - definitions are never mutated after parse.
//! For execution, see the `runtime` module.

mod batch;
mod properties;

pub use batch::{
    Batch, BatchRequest, DefinitionError, LinkDef, Position, ResourceDefinition, ServiceDef, UnitDef,
};
pub use properties::PropertyMap;
