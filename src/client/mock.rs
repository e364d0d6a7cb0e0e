//! In-memory flow platform for testing
//!
//! Keeps a tiny model of one platform instance: type catalogs, existing
//! objects, created objects with versions, relationships per type and
//! notices. Any operation can be made to fail for a given name or id, and
//! every call is recorded for assertions.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    short_type_name, Category, ClientError, ClientResult, ComponentState, Entity, FlowClient,
    LinkSpec, Notice, RelationshipInfo, ResourceSummary, ScopeStatus, ServiceSpec, TypeDescriptor,
    UnitSpec,
};

/// Unit types registered by [`MockFlowClient::with_standard_types`]
const STANDARD_UNIT_TYPES: &[(&str, &[&str])] = &[
    ("org.apache.nifi.processors.standard.GenerateFlowFile", &["success"]),
    ("org.apache.nifi.processors.standard.LogAttribute", &["success"]),
    ("org.apache.nifi.processors.standard.HandleHttpRequest", &["success"]),
    ("org.apache.nifi.processors.standard.HandleHttpResponse", &["success", "failure"]),
    ("org.apache.nifi.processors.standard.RouteOnAttribute", &["unmatched"]),
    ("org.apache.nifi.processors.attributes.UpdateAttribute", &["success"]),
    ("org.apache.nifi.processors.standard.EvaluateJsonPath", &["matched", "unmatched", "failure"]),
    (
        "org.apache.nifi.processors.standard.InvokeHTTP",
        &["Original", "Response", "Retry", "No Retry", "Failure"],
    ),
    ("org.apache.nifi.processors.standard.PutFile", &["success", "failure"]),
];

/// Service types registered by [`MockFlowClient::with_standard_types`]
const STANDARD_SERVICE_TYPES: &[&str] = &[
    "org.apache.nifi.http.StandardHttpContextMap",
    "org.apache.nifi.dbcp.DBCPConnectionPool",
    "org.apache.nifi.json.JsonTreeReader",
    "org.apache.nifi.json.JsonRecordSetWriter",
    "org.apache.nifi.ssl.StandardSSLContextService",
];

/// One call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Trait method name, e.g. `create_service`
    pub operation: String,
    /// Name for creates, id for everything else, scope for listings
    pub target: String,
}

#[derive(Debug, Clone)]
struct StoredObject {
    category: Category,
    entity: Entity,
    run_state: String,
    terminated: Vec<String>,
}

#[derive(Debug, Clone)]
struct Failure {
    operation: String,
    target: String,
    error: ClientError,
}

#[derive(Debug, Default)]
struct MockState {
    unit_types: Vec<TypeDescriptor>,
    service_types: Vec<TypeDescriptor>,
    catalog_errors: HashMap<Category, ClientError>,
    listing_error: Option<ClientError>,
    status_error: Option<ClientError>,
    existing: Vec<ResourceSummary>,
    objects: BTreeMap<String, StoredObject>,
    relationships: HashMap<String, Vec<String>>,
    invalid: Vec<String>,
    notices: Vec<Notice>,
    failures: Vec<Failure>,
    calls: Vec<RecordedCall>,
    next_id: u64,
}

impl MockState {
    fn record(&mut self, operation: &str, target: &str) {
        self.calls.push(RecordedCall {
            operation: operation.to_string(),
            target: target.to_string(),
        });
    }

    fn injected(&self, operation: &str, target: &str) -> Option<ClientError> {
        self.failures
            .iter()
            .find(|f| f.operation == operation && (f.target == target || f.target == "*"))
            .map(|f| f.error.clone())
    }

    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_id)
    }

    fn relationships_for(&self, type_name: &str) -> Vec<String> {
        self.relationships
            .get(short_type_name(type_name))
            .cloned()
            .unwrap_or_else(|| vec!["success".to_string(), "failure".to_string()])
    }

    fn stored(&mut self, id: &str, category: Category) -> ClientResult<&mut StoredObject> {
        match self.objects.get_mut(id) {
            Some(obj) if obj.category == category => Ok(obj),
            _ => Err(ClientError::NotFound(format!("{} {}", category, id))),
        }
    }

    fn insert(&mut self, category: Category, entity: Entity, run_state: &str) {
        self.existing.push(ResourceSummary {
            id: entity.id.clone(),
            name: entity.name.clone(),
            type_name: entity.type_name.clone(),
            category,
        });
        self.objects.insert(
            entity.id.clone(),
            StoredObject {
                category,
                entity,
                run_state: run_state.to_string(),
                terminated: Vec::new(),
            },
        );
    }

    fn remove(&mut self, id: &str, category: Category) -> ClientResult<()> {
        self.stored(id, category)?;
        self.objects.remove(id);
        self.existing.retain(|r| r.id != id);
        Ok(())
    }
}

/// Mock client that keeps everything in memory
#[derive(Debug, Default)]
pub struct MockFlowClient {
    state: Mutex<MockState>,
}

impl MockFlowClient {
    /// Empty platform: no types, no objects
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform knowing a handful of common NiFi types
    pub fn with_standard_types() -> Self {
        let mock = Self::new();
        {
            let mut state = mock.state.lock();
            for (type_name, relationships) in STANDARD_UNIT_TYPES {
                state.unit_types.push(TypeDescriptor::new(*type_name));
                state.relationships.insert(
                    short_type_name(type_name).to_string(),
                    relationships.iter().map(|r| r.to_string()).collect(),
                );
            }
            for type_name in STANDARD_SERVICE_TYPES {
                state.service_types.push(TypeDescriptor::new(*type_name));
            }
        }
        mock
    }

    pub fn with_unit_type(self, descriptor: TypeDescriptor) -> Self {
        self.state.lock().unit_types.push(descriptor);
        self
    }

    pub fn with_service_type(self, descriptor: TypeDescriptor) -> Self {
        self.state.lock().service_types.push(descriptor);
        self
    }

    /// Output relationships reported for a unit type (matched on short name)
    pub fn with_relationships(self, type_name: &str, relationships: &[&str]) -> Self {
        self.state.lock().relationships.insert(
            short_type_name(type_name).to_string(),
            relationships.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn with_notice(self, level: &str, message: &str) -> Self {
        self.state.lock().notices.push(Notice {
            level: level.to_string(),
            message: message.to_string(),
            source_id: None,
            source_name: None,
        });
        self
    }

    /// Add an object that exists before the batch runs; returns its id
    pub fn add_existing(&self, category: Category, name: &str, type_name: &str) -> String {
        let mut state = self.state.lock();
        let id = state.next_id();
        let entity = Entity {
            id: id.clone(),
            name: name.to_string(),
            type_name: type_name.to_string(),
            version: 1,
            ..Default::default()
        };
        let run_state = match category {
            Category::Service => "ENABLED",
            _ => "STOPPED",
        };
        state.insert(category, entity, run_state);
        id
    }

    /// Make `operation` fail for a name (creates) or id (everything else)
    ///
    /// `"*"` matches every target.
    pub fn fail_on(&self, operation: &str, target: &str, error: ClientError) {
        self.state.lock().failures.push(Failure {
            operation: operation.to_string(),
            target: target.to_string(),
            error,
        });
    }

    pub fn fail_catalog(&self, category: Category, error: ClientError) {
        self.state.lock().catalog_errors.insert(category, error);
    }

    pub fn fail_listing(&self, error: ClientError) {
        self.state.lock().listing_error = Some(error);
    }

    pub fn fail_status(&self, error: ClientError) {
        self.state.lock().status_error = Some(error);
    }

    /// Report the named object as INVALID in scope status
    pub fn mark_invalid(&self, name: &str) {
        self.state.lock().invalid.push(name.to_string());
    }

    // ─────────────────────────────────────────────────────────────
    // Assertions
    // ─────────────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Targets of every call to `operation`, in call order
    pub fn targets_of(&self, operation: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.target.clone())
            .collect()
    }

    /// Names of objects currently present, in id order
    pub fn object_names(&self) -> Vec<String> {
        self.state
            .lock()
            .objects
            .values()
            .map(|o| o.entity.name.clone())
            .collect()
    }

    pub fn id_of(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .objects
            .values()
            .find(|o| o.entity.name == name)
            .map(|o| o.entity.id.clone())
    }

    /// Properties an object was created with
    pub fn properties_of(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .objects
            .values()
            .find(|o| o.entity.name == name)
            .map(|o| o.entity.properties.clone())
    }

    /// Relationships currently auto-terminated on a unit
    pub fn terminated_of(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .objects
            .values()
            .find(|o| o.entity.name == name)
            .map(|o| o.terminated.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FlowClient for MockFlowClient {
    async fn list_resource_types(&self, category: Category) -> ClientResult<Vec<TypeDescriptor>> {
        let mut state = self.state.lock();
        state.record("list_resource_types", category.as_str());
        if let Some(err) = state.catalog_errors.get(&category) {
            return Err(err.clone());
        }
        Ok(match category {
            Category::Service => state.service_types.clone(),
            Category::Unit => state.unit_types.clone(),
            Category::Link => Vec::new(),
        })
    }

    async fn list_resources(
        &self,
        scope: &str,
        category: Category,
    ) -> ClientResult<Vec<ResourceSummary>> {
        let mut state = self.state.lock();
        state.record("list_resources", scope);
        if let Some(err) = &state.listing_error {
            return Err(err.clone());
        }
        Ok(state
            .existing
            .iter()
            .filter(|r| r.category == category)
            .cloned()
            .collect())
    }

    async fn create_service(&self, _scope: &str, spec: &ServiceSpec) -> ClientResult<Entity> {
        let mut state = self.state.lock();
        state.record("create_service", &spec.name);
        if let Some(err) = state.injected("create_service", &spec.name) {
            return Err(err);
        }
        let entity = Entity {
            id: state.next_id(),
            name: spec.name.clone(),
            type_name: spec.type_name.clone(),
            version: 1,
            properties: spec.properties.clone(),
            ..Default::default()
        };
        state.insert(Category::Service, entity.clone(), "DISABLED");
        Ok(entity)
    }

    async fn create_unit(&self, _scope: &str, spec: &UnitSpec) -> ClientResult<Entity> {
        let mut state = self.state.lock();
        state.record("create_unit", &spec.name);
        if let Some(err) = state.injected("create_unit", &spec.name) {
            return Err(err);
        }
        let mut names = state.relationships_for(&spec.type_name);
        // Routing units expose one relationship per user-defined property
        if short_type_name(&spec.type_name) == "RouteOnAttribute" {
            names.extend(
                spec.properties
                    .keys()
                    .filter(|k| k.as_str() != "Routing Strategy")
                    .cloned(),
            );
        }
        let relationships = names
            .into_iter()
            .map(|name| RelationshipInfo {
                name,
                auto_terminate: false,
            })
            .collect();
        let entity = Entity {
            id: state.next_id(),
            name: spec.name.clone(),
            type_name: spec.type_name.clone(),
            version: 1,
            properties: spec.properties.clone(),
            relationships,
            ..Default::default()
        };
        state.insert(Category::Unit, entity.clone(), "STOPPED");
        Ok(entity)
    }

    async fn create_link(&self, _scope: &str, spec: &LinkSpec) -> ClientResult<Entity> {
        let mut state = self.state.lock();
        let label = format!("{}->{}", spec.source_id, spec.target_id);
        state.record("create_link", &label);
        if let Some(err) = state.injected("create_link", &label) {
            return Err(err);
        }
        for endpoint in [&spec.source_id, &spec.target_id] {
            state.stored(endpoint, Category::Unit)?;
        }
        let entity = Entity {
            id: state.next_id(),
            name: spec.relationships.join(","),
            type_name: "connection".to_string(),
            version: 1,
            ..Default::default()
        };
        state.insert(Category::Link, entity.clone(), "RUNNING");
        Ok(entity)
    }

    async fn enable_service(&self, id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.record("enable_service", id);
        if let Some(err) = state.injected("enable_service", id) {
            return Err(err);
        }
        let obj = state.stored(id, Category::Service)?;
        obj.run_state = "ENABLED".to_string();
        obj.entity.version += 1;
        Ok(())
    }

    async fn disable_service(&self, id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.record("disable_service", id);
        if let Some(err) = state.injected("disable_service", id) {
            return Err(err);
        }
        let obj = state.stored(id, Category::Service)?;
        obj.run_state = "DISABLED".to_string();
        obj.entity.version += 1;
        Ok(())
    }

    async fn delete_service(&self, id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.record("delete_service", id);
        if let Some(err) = state.injected("delete_service", id) {
            return Err(err);
        }
        state.remove(id, Category::Service)
    }

    async fn stop_unit(&self, id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.record("stop_unit", id);
        if let Some(err) = state.injected("stop_unit", id) {
            return Err(err);
        }
        let obj = state.stored(id, Category::Unit)?;
        obj.run_state = "STOPPED".to_string();
        Ok(())
    }

    async fn delete_unit(&self, id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.record("delete_unit", id);
        if let Some(err) = state.injected("delete_unit", id) {
            return Err(err);
        }
        state.remove(id, Category::Unit)
    }

    async fn delete_link(&self, id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.record("delete_link", id);
        if let Some(err) = state.injected("delete_link", id) {
            return Err(err);
        }
        state.remove(id, Category::Link)
    }

    async fn get_unit(&self, id: &str) -> ClientResult<Entity> {
        let mut state = self.state.lock();
        state.record("get_unit", id);
        if let Some(err) = state.injected("get_unit", id) {
            return Err(err);
        }
        let obj = state.stored(id, Category::Unit)?;
        let mut entity = obj.entity.clone();
        for rel in &mut entity.relationships {
            rel.auto_terminate = obj.terminated.iter().any(|t| t == &rel.name);
        }
        Ok(entity)
    }

    async fn update_unit_relationships(
        &self,
        id: &str,
        terminated: &[String],
    ) -> ClientResult<Entity> {
        let mut state = self.state.lock();
        state.record("update_unit_relationships", id);
        if let Some(err) = state.injected("update_unit_relationships", id) {
            return Err(err);
        }
        let obj = state.stored(id, Category::Unit)?;
        obj.terminated = terminated.to_vec();
        obj.entity.version += 1;
        let mut entity = obj.entity.clone();
        for rel in &mut entity.relationships {
            rel.auto_terminate = terminated.contains(&rel.name);
        }
        Ok(entity)
    }

    async fn get_scope_status(&self, scope: &str) -> ClientResult<ScopeStatus> {
        let mut state = self.state.lock();
        state.record("get_scope_status", scope);
        if let Some(err) = &state.status_error {
            return Err(err.clone());
        }
        let components = state
            .objects
            .values()
            .filter(|o| o.category != Category::Link)
            .map(|o| {
                let invalid = state.invalid.contains(&o.entity.name);
                ComponentState {
                    id: o.entity.id.clone(),
                    name: o.entity.name.clone(),
                    category: o.category,
                    run_state: o.run_state.clone(),
                    validation_status: if invalid { "INVALID" } else { "VALID" }.to_string(),
                    validation_errors: if invalid {
                        vec![format!("'{}' is invalid", o.entity.name)]
                    } else {
                        Vec::new()
                    },
                }
            })
            .collect();
        Ok(ScopeStatus {
            components,
            notices: state.notices.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;

    fn unit(name: &str, type_name: &str) -> UnitSpec {
        UnitSpec {
            name: name.into(),
            type_name: type_name.into(),
            position: Position::default(),
            properties: Default::default(),
        }
    }

    #[tokio::test]
    async fn created_objects_are_listed_and_deletable() {
        let mock = MockFlowClient::with_standard_types();
        let entity = mock.create_unit("g", &unit("Log", "LogAttribute")).await.unwrap();

        let listed = mock.list_resources("g", Category::Unit).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Log");

        mock.delete_unit(&entity.id).await.unwrap();
        assert!(mock.object_names().is_empty());
        assert!(matches!(
            mock.delete_unit(&entity.id).await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn injected_failures_hit_only_their_target() {
        let mock = MockFlowClient::new();
        mock.fail_on("create_unit", "Bad", ClientError::BadRequest("nope".into()));

        assert!(mock.create_unit("g", &unit("Bad", "X")).await.is_err());
        assert!(mock.create_unit("g", &unit("Good", "X")).await.is_ok());
        assert_eq!(mock.targets_of("create_unit"), vec!["Bad", "Good"]);
    }

    #[tokio::test]
    async fn relationships_follow_type_table() {
        let mock = MockFlowClient::with_standard_types();
        let entity = mock
            .create_unit("g", &unit("Call", "org.apache.nifi.processors.standard.InvokeHTTP"))
            .await
            .unwrap();
        assert_eq!(entity.relationships.len(), 5);

        mock.update_unit_relationships(&entity.id, &["Retry".to_string()])
            .await
            .unwrap();
        let fetched = mock.get_unit(&entity.id).await.unwrap();
        let retry = fetched.relationships.iter().find(|r| r.name == "Retry").unwrap();
        assert!(retry.auto_terminate);
        assert_eq!(mock.terminated_of("Call"), vec!["Retry"]);
    }

    #[tokio::test]
    async fn links_require_existing_endpoints() {
        let mock = MockFlowClient::new();
        let a = mock.create_unit("g", &unit("A", "X")).await.unwrap();
        let spec = LinkSpec {
            source_id: a.id.clone(),
            target_id: "missing".into(),
            relationships: vec!["success".into()],
        };
        assert!(matches!(
            mock.create_link("g", &spec).await,
            Err(ClientError::NotFound(_))
        ));
    }
}
