//! Error types with fix suggestions
//!
//! Error code ranges:
//! - FLW-000-009: Input / configuration errors
//! - FLW-010-019: Pre-flight validation errors (block the whole batch)
//! - FLW-020-029: Reference resolution errors (block one resource)
//! - FLW-030-039: Schema / expression errors (block one resource)
//! - FLW-040-049: Remote errors

use thiserror::Error;

use crate::client::ClientError;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Error taxonomy used for propagation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Raised before any mutation; blocks the entire batch
    Validation,
    /// Unresolvable or ambiguous symbolic reference; blocks the owning resource
    Resolution,
    /// Property or expression failed validation; blocks the owning resource
    Schema,
    /// The remote collaborator failed
    Remote,
    /// Stale-version write; never retried
    Conflict,
}

#[derive(Error, Debug)]
pub enum FlowError {
    // ─────────────────────────────────────────────────────────────
    // Input / configuration (FLW-000 to FLW-009)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLW-001] Failed to parse batch: {details}")]
    ParseError { details: String },

    #[error("[FLW-002] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[FLW-003] Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("[FLW-004] No target scope: pass --scope, set targetScope in the batch or assembly.default_scope")]
    MissingScope,

    // ─────────────────────────────────────────────────────────────
    // Pre-flight validation (FLW-010 to FLW-019)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLW-010] Invalid definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("[FLW-011] Unknown {category} type '{type_name}'")]
    UnknownType { category: String, type_name: String },

    #[error("[FLW-012] Name '{name}' already exists in scope ({existing})")]
    DuplicateName { name: String, existing: String },

    #[error("[FLW-013] Could not fetch {category} type catalog: {reason}")]
    TypeCatalogUnavailable { category: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Reference resolution (FLW-020 to FLW-029)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLW-020] Unresolved reference '{reference}'")]
    UnresolvedReference { reference: String },

    #[error("[FLW-021] Ambiguous reference '{reference}': matches {}", .candidates.join(", "))]
    AmbiguousReference {
        reference: String,
        candidates: Vec<String>,
    },

    // ─────────────────────────────────────────────────────────────
    // Schema / expression (FLW-030 to FLW-039)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLW-030] Property '{property}' is invalid: {reason}")]
    InvalidProperty { property: String, reason: String },

    #[error("[FLW-031] Expression in '{property}' cannot be corrected: {details}")]
    Expression { property: String, details: String },

    // ─────────────────────────────────────────────────────────────
    // Remote (FLW-040 to FLW-049)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLW-040] Remote call failed: {0}")]
    Remote(#[from] ClientError),
}

impl FlowError {
    /// Which taxonomy bucket this error falls into
    pub fn class(&self) -> ErrorClass {
        match self {
            FlowError::ParseError { .. }
            | FlowError::Io(_)
            | FlowError::ConfigError { .. }
            | FlowError::MissingScope
            | FlowError::InvalidDefinition { .. }
            | FlowError::UnknownType { .. }
            | FlowError::DuplicateName { .. }
            | FlowError::TypeCatalogUnavailable { .. } => ErrorClass::Validation,
            FlowError::UnresolvedReference { .. } | FlowError::AmbiguousReference { .. } => {
                ErrorClass::Resolution
            }
            FlowError::InvalidProperty { .. } | FlowError::Expression { .. } => ErrorClass::Schema,
            FlowError::Remote(ClientError::Conflict(_)) => ErrorClass::Conflict,
            FlowError::Remote(_) => ErrorClass::Remote,
        }
    }
}

impl From<serde_yaml::Error> for FlowError {
    fn from(e: serde_yaml::Error) -> Self {
        FlowError::ParseError {
            details: e.to_string(),
        }
    }
}

impl FixSuggestion for FlowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            FlowError::ParseError { .. } => {
                Some("Check batch syntax: every resource needs a 'kind' (service, unit or link)")
            }
            FlowError::Io(_) => Some("Check file path and permissions"),
            FlowError::ConfigError { .. } => Some("Run 'flowwright config path' and fix the TOML file"),
            FlowError::MissingScope => None,
            FlowError::InvalidDefinition { .. } => {
                Some("Give every service and unit a non-empty name and type")
            }
            FlowError::UnknownType { .. } => {
                Some("Use the fully qualified type name listed by the platform")
            }
            FlowError::DuplicateName { .. } => {
                Some("Rename the resource or update the existing one instead")
            }
            FlowError::TypeCatalogUnavailable { .. } => {
                Some("Check connectivity and credentials for the flow platform")
            }
            FlowError::UnresolvedReference { .. } => {
                Some("Define the service in this batch or reference an existing one by id")
            }
            FlowError::AmbiguousReference { .. } => {
                Some("Qualify the reference (@service:Name / @unit:Name) or use the id")
            }
            FlowError::InvalidProperty { .. } => Some("Check the property against the type's schema"),
            FlowError::Expression { .. } => {
                Some("Use chained syntax: ${attr:fn()} and :and(${...}) instead of infix operators")
            }
            FlowError::Remote(ClientError::Conflict(_)) => {
                Some("The object changed concurrently; refresh and retry the operation")
            }
            FlowError::Remote(_) => Some("Check the platform logs for the failing request"),
        }
    }
}
