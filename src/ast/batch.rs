//! Batch request model
//!
//! A batch arrives as YAML or JSON:
//!
//! ```yaml
//! targetScope: 5b1c0d5e-0000-1000-8000-000000000001
//! resources:
//!   - kind: service
//!     name: JsonReader
//!     type: org.apache.nifi.json.JsonTreeReader
//!   - kind: unit
//!     name: Receive
//!     type: org.apache.nifi.processors.standard.HandleHttpRequest
//!     position: { x: 0, y: 0 }
//!     properties:
//!       Listening Port: 8080
//!   - kind: link
//!     source: Receive
//!     target: Respond
//!     relationships: [success]
//! links: []
//! ```
//!
//! Inline links and the separate `links` list are merged, inline first.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::properties::{scalar_map, PropertyMap};
use crate::client::Category;
use crate::error::{FlowError, Result};

/// Canvas position of a processing unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub name: String,
    #[serde(default, rename = "type", alias = "service_type")]
    pub type_name: String,
    #[serde(default, deserialize_with = "scalar_map")]
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDef {
    pub name: String,
    #[serde(default, rename = "type", alias = "processor_type")]
    pub type_name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default, deserialize_with = "scalar_map")]
    pub properties: PropertyMap,
}

/// Directed link between two units, by batch-local (or remote) name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDef {
    #[serde(alias = "sourceName", alias = "source_name")]
    pub source: String,
    #[serde(alias = "targetName", alias = "target_name")]
    pub target: String,
    #[serde(default)]
    pub relationships: Vec<String>,
}

impl LinkDef {
    /// Display label, e.g. `Receive.success→Respond`
    pub fn label(&self) -> String {
        format!("{}.{}→{}", self.source, self.relationships.join(","), self.target)
    }
}

/// One entry of `resources`, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDefinition {
    #[serde(alias = "controller_service")]
    Service(ServiceDef),
    #[serde(alias = "processor", alias = "processing_unit")]
    Unit(UnitDef),
    #[serde(alias = "connection")]
    Link(LinkDef),
}

impl ResourceDefinition {
    pub fn name(&self) -> String {
        match self {
            ResourceDefinition::Service(s) => s.name.clone(),
            ResourceDefinition::Unit(u) => u.name.clone(),
            ResourceDefinition::Link(l) => l.label(),
        }
    }
}

/// Raw request as parsed from YAML/JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default, alias = "target_scope", alias = "scope")]
    pub target_scope: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
}

impl BatchRequest {
    /// Parse a batch from YAML (JSON is accepted as a YAML subset)
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Split by kind and pick the scope
    ///
    /// Scope precedence: explicit override, then `targetScope`, then the
    /// configured default.
    pub fn into_batch(self, scope_override: Option<&str>, default_scope: Option<&str>) -> Result<Batch> {
        let scope = scope_override
            .map(str::to_string)
            .or(self.target_scope.filter(|s| !s.trim().is_empty()))
            .or_else(|| default_scope.map(str::to_string))
            .ok_or(FlowError::MissingScope)?;

        let mut batch = Batch {
            scope,
            services: Vec::new(),
            units: Vec::new(),
            links: Vec::new(),
        };

        for resource in self.resources {
            match resource {
                ResourceDefinition::Service(s) => batch.services.push(s),
                ResourceDefinition::Unit(u) => batch.units.push(u),
                ResourceDefinition::Link(l) => batch.links.push(l),
            }
        }
        batch.links.extend(self.links);

        Ok(batch)
    }
}

/// Normalized batch: one list per kind, links merged
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub scope: String,
    pub services: Vec<ServiceDef>,
    pub units: Vec<UnitDef>,
    pub links: Vec<LinkDef>,
}

impl Batch {
    /// Number of definitions, links included
    pub fn len(&self) -> usize {
        self.services.len() + self.units.len() + self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structural checks that need no remote call
    ///
    /// Any error here blocks the whole batch.
    pub fn definition_errors(&self) -> Vec<DefinitionError> {
        let mut errors = Vec::new();

        for service in &self.services {
            check_named(Category::Service, &service.name, &service.type_name, &mut errors);
        }
        for unit in &self.units {
            check_named(Category::Unit, &unit.name, &unit.type_name, &mut errors);
        }
        for link in &self.links {
            if link.source.trim().is_empty() || link.target.trim().is_empty() {
                errors.push(DefinitionError::new(
                    Category::Link,
                    link.label(),
                    "link needs both a source and a target",
                ));
            }
            if link.relationships.iter().all(|r| r.trim().is_empty()) {
                errors.push(DefinitionError::new(
                    Category::Link,
                    link.label(),
                    "link needs at least one relationship",
                ));
            }
        }

        errors
    }
}

/// A definition that cannot be created as written
#[derive(Debug)]
pub struct DefinitionError {
    pub category: Category,
    /// Definition name, or a placeholder when the name is blank
    pub name: String,
    pub error: FlowError,
}

impl DefinitionError {
    fn new(category: Category, name: String, reason: impl Into<String>) -> Self {
        Self {
            category,
            error: FlowError::InvalidDefinition {
                name: name.clone(),
                reason: reason.into(),
            },
            name,
        }
    }
}

fn check_named(category: Category, name: &str, type_name: &str, errors: &mut Vec<DefinitionError>) {
    let label = if name.trim().is_empty() {
        let placeholder = format!("<unnamed {}>", category);
        errors.push(DefinitionError::new(
            category,
            placeholder.clone(),
            format!("{} name must not be empty", category),
        ));
        placeholder
    } else {
        name.to_string()
    };
    if type_name.trim().is_empty() {
        errors.push(DefinitionError::new(
            category,
            label,
            format!("{} type must not be empty", category),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BATCH: &str = r#"
targetScope: root-group
resources:
  - kind: service
    name: Pool
    type: org.apache.nifi.dbcp.DBCPConnectionPool
  - kind: processor
    name: Receive
    type: org.apache.nifi.processors.standard.HandleHttpRequest
    position: { x: 10, y: 20 }
    properties:
      Listening Port: 8080
  - kind: connection
    sourceName: Receive
    targetName: Log
    relationships: [success]
links:
  - source: Log
    target: Sink
    relationships: [success]
"#;

    #[test]
    fn parses_and_merges_links() {
        let batch = BatchRequest::from_yaml(BATCH).unwrap().into_batch(None, None).unwrap();

        assert_eq!(batch.scope, "root-group");
        assert_eq!(batch.services.len(), 1);
        assert_eq!(batch.units[0].position, Position { x: 10.0, y: 20.0 });
        assert_eq!(batch.units[0].properties["Listening Port"], "8080");
        let sources: Vec<&str> = batch.links.iter().map(|l| l.source.as_str()).collect();
        assert_eq!(sources, vec!["Receive", "Log"]);
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn json_batches_parse_too() {
        let json = r#"{"scope": "g1", "resources": [{"kind": "unit", "name": "A", "type": "LogAttribute"}]}"#;
        let batch = BatchRequest::from_yaml(json).unwrap().into_batch(None, None).unwrap();
        assert_eq!(batch.scope, "g1");
        assert_eq!(batch.units[0].name, "A");
    }

    #[test]
    fn scope_precedence() {
        let request = BatchRequest::from_yaml(BATCH).unwrap();
        let batch = request.clone().into_batch(Some("override"), Some("default")).unwrap();
        assert_eq!(batch.scope, "override");

        let request = BatchRequest {
            target_scope: None,
            ..request
        };
        assert_eq!(request.clone().into_batch(None, Some("default")).unwrap().scope, "default");
        assert!(matches!(request.into_batch(None, None), Err(FlowError::MissingScope)));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let err = BatchRequest::from_yaml("resources:\n  - kind: funnel\n    name: F\n").unwrap_err();
        assert!(matches!(err, FlowError::ParseError { .. }));
    }

    #[test]
    fn definition_errors_catch_blank_fields() {
        let batch = BatchRequest::from_yaml(
            r#"
scope: g
resources:
  - kind: service
    name: ""
    type: X
  - kind: unit
    name: U
    type: " "
  - kind: link
    source: U
    target: V
"#,
        )
        .unwrap()
        .into_batch(None, None)
        .unwrap();

        let errors = batch.definition_errors();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e.error, FlowError::InvalidDefinition { .. })));
        assert_eq!(errors[0].category, Category::Service);
        assert_eq!(errors[1].name, "U");
        assert_eq!(errors[2].category, Category::Link);
    }

    #[test]
    fn missing_type_is_reported_not_a_parse_error() {
        let batch = BatchRequest::from_yaml(
            r#"
scope: g
resources:
  - kind: processor
    name: MissingType
    position: { x: 100, y: 100 }
"#,
        )
        .unwrap()
        .into_batch(None, None)
        .unwrap();

        let errors = batch.definition_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, Category::Unit);
        assert_eq!(errors[0].name, "MissingType");
        assert!(errors[0].error.to_string().contains("unit type must not be empty"));
    }
}
