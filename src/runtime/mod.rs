//! Runtime Module - Batch assembly
//!
//! Contains the per-invocation machinery:
//! - `context`: explicit request-scoped state
//! - `ledger`: created-object ledger for compensation
//! - `orchestrator`: the assembly state machine
//! - `rollback`: compensating deletion in reverse creation order
//! - `report`: response model and counters
//!
//! For the request model, see the `ast` module.

mod context;
mod ledger;
mod orchestrator;
mod report;
mod rollback;

pub use context::InvocationContext;
pub use ledger::{CreatedObjectLedger, LedgerEntry};
pub use orchestrator::{is_critical, Assembler, AssemblyPhase};
pub use report::{
    rejected_results, FlowResponse, ObjectType, OperationStats, PerObjectResult, ReviewStatus,
    Severity, Status, Summary, ValidationFinding, ValidationResult,
};
pub use rollback::{RollbackExecutor, RollbackItem, RollbackOutcome, RollbackSummary};
