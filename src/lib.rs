//! Flowwright - batch flow assembly for NiFi-style flow platforms
//!
//! Takes a batch of service, unit and link definitions and builds it in one
//! scope of a platform that only offers single-object CRUD: ordered creation,
//! symbolic reference resolution, property and expression repair, relationship
//! auto-termination, and compensating rollback in reverse creation order.
//!
//! Layers, bottom up:
//! - `error`, `config`, `event`: ambient plumbing
//! - `ast`: the batch request model
//! - `client`: the remote platform interface (HTTP and in-memory)
//! - `el`, `schema`, `resolve`: per-definition repair
//! - `preflight`, `terminate`, `review`: checks around creation
//! - `runtime`: the orchestrator, ledger, rollback and response model

pub mod ast;
pub mod client;
pub mod config;
pub mod el;
pub mod error;
pub mod event;
pub mod preflight;
pub mod resolve;
pub mod review;
pub mod runtime;
pub mod schema;
pub mod terminate;

pub use ast::{Batch, BatchRequest, ResourceDefinition};
pub use client::{FlowClient, MockFlowClient, NifiClient};
pub use config::FlowConfig;
pub use error::{FixSuggestion, FlowError, Result};
pub use event::{Event, EventKind, EventLog};
pub use runtime::{Assembler, FlowResponse, InvocationContext, Status};
