//! Pre-flight checks
//!
//! Run before anything is created. A failing check blocks the whole batch:
//! nothing is created and nothing needs compensation.
//!
//! - `types`: every requested type exists in the platform catalog
//! - `duplicates`: no name collides within its category

mod duplicates;
mod types;

pub use duplicates::{intra_batch, DuplicateDetector};
pub use types::{TypeCheck, TypeValidator};
