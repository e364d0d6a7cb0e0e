//! # Remote Client Abstraction
//!
//! The flow platform only offers single-object CRUD. Everything the assembly
//! engine needs from it goes through the [`FlowClient`] trait:
//!
//! - [`NifiClient`] - Production client for the NiFi REST API
//! - [`MockFlowClient`] - In-memory client with failure injection
//!
//! Writes carry an optimistic-concurrency version. Implementations must surface
//! a stale version as [`ClientError::Conflict`] and never retry it.

mod http;
mod mock;

pub use http::NifiClient;
pub use mock::{MockFlowClient, RecordedCall};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Position, PropertyMap};

// ============================================================================
// ERRORS
// ============================================================================

/// Failure of a single remote call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

// ============================================================================
// CATEGORIES
// ============================================================================

/// Kind of remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Service,
    Unit,
    Link,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Service => "service",
            Category::Unit => "unit",
            Category::Link => "link",
        }
    }

    /// Parse the qualifier used in `@service:Name` style references
    pub fn from_qualifier(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "service" | "controller_service" => Some(Category::Service),
            "unit" | "processor" => Some(Category::Unit),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WIRE-INDEPENDENT MODEL
// ============================================================================

/// Entry of the remote type catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Fully qualified type name
    pub type_name: String,
    /// Short display name
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TypeDescriptor {
    /// Build a descriptor whose title is the last segment of the type name
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let title = short_type_name(&type_name).to_string();
        Self {
            type_name,
            title,
            description: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Existing named object in a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub category: Category,
}

/// Output relationship of a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub name: String,
    #[serde(default)]
    pub auto_terminate: bool,
}

/// A remote object as returned by create/get calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub type_name: String,
    /// Optimistic concurrency token
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipInfo>,
}

/// Payload for creating a service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub type_name: String,
    pub properties: PropertyMap,
}

/// Payload for creating a processing unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    pub name: String,
    pub type_name: String,
    pub position: Position,
    pub properties: PropertyMap,
}

/// Payload for creating a link between two units
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub source_id: String,
    pub target_id: String,
    pub relationships: Vec<String>,
}

/// Run/validation state of one component in a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub id: String,
    pub name: String,
    pub category: Category,
    /// e.g. RUNNING, STOPPED, ENABLED, DISABLED
    pub run_state: String,
    /// VALID, INVALID or VALIDATING
    pub validation_status: String,
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

impl ComponentState {
    pub fn is_invalid(&self) -> bool {
        self.validation_status.eq_ignore_ascii_case("INVALID")
    }

    pub fn is_disabled(&self) -> bool {
        self.run_state.eq_ignore_ascii_case("DISABLED")
    }
}

/// Recent platform notice (bulletin)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

impl Notice {
    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("ERROR")
    }

    pub fn is_warning(&self) -> bool {
        self.level.eq_ignore_ascii_case("WARNING") || self.level.eq_ignore_ascii_case("WARN")
    }
}

/// Aggregate state of a scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeStatus {
    pub components: Vec<ComponentState>,
    pub notices: Vec<Notice>,
}

/// Last segment of a dotted type name
pub fn short_type_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

// ============================================================================
// CLIENT TRAIT (ASYNC)
// ============================================================================

/// Typed CRUD/query interface to the flow platform
///
/// Reads may be retried by implementations; writes never are.
#[async_trait]
pub trait FlowClient: Send + Sync {
    /// Type catalog for services or units
    async fn list_resource_types(&self, category: Category) -> ClientResult<Vec<TypeDescriptor>>;

    /// Existing named objects of one category inside a scope
    async fn list_resources(
        &self,
        scope: &str,
        category: Category,
    ) -> ClientResult<Vec<ResourceSummary>>;

    async fn create_service(&self, scope: &str, spec: &ServiceSpec) -> ClientResult<Entity>;

    async fn create_unit(&self, scope: &str, spec: &UnitSpec) -> ClientResult<Entity>;

    async fn create_link(&self, scope: &str, spec: &LinkSpec) -> ClientResult<Entity>;

    async fn enable_service(&self, id: &str) -> ClientResult<()>;

    async fn disable_service(&self, id: &str) -> ClientResult<()>;

    async fn delete_service(&self, id: &str) -> ClientResult<()>;

    async fn stop_unit(&self, id: &str) -> ClientResult<()>;

    async fn delete_unit(&self, id: &str) -> ClientResult<()>;

    async fn delete_link(&self, id: &str) -> ClientResult<()>;

    /// Full unit entity, including its available relationships
    async fn get_unit(&self, id: &str) -> ClientResult<Entity>;

    /// Replace the set of auto-terminated relationships of a unit
    async fn update_unit_relationships(
        &self,
        id: &str,
        terminated: &[String],
    ) -> ClientResult<Entity>;

    async fn get_scope_status(&self, scope: &str) -> ClientResult<ScopeStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_type_name_takes_last_segment() {
        assert_eq!(
            short_type_name("org.apache.nifi.processors.standard.LogAttribute"),
            "LogAttribute"
        );
        assert_eq!(short_type_name("LogAttribute"), "LogAttribute");
    }

    #[test]
    fn qualifier_parsing() {
        assert_eq!(Category::from_qualifier("Service"), Some(Category::Service));
        assert_eq!(Category::from_qualifier("processor"), Some(Category::Unit));
        assert_eq!(Category::from_qualifier("link"), None);
    }

    #[test]
    fn notice_levels() {
        let notice = Notice {
            level: "ERROR".into(),
            message: "boom".into(),
            source_id: None,
            source_name: None,
        };
        assert!(notice.is_error());
        assert!(!notice.is_warning());
    }
}
