//! NiFi REST client
//!
//! Maps [`FlowClient`] onto `/nifi-api`. Writes that need a revision fetch the
//! current one first; a stale revision comes back as HTTP 409 and is surfaced
//! as [`ClientError::Conflict`].

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::{
    Category, ClientError, ClientResult, ComponentState, Entity, FlowClient, LinkSpec, Notice,
    RelationshipInfo, ResourceSummary, ScopeStatus, ServiceSpec, TypeDescriptor, UnitSpec,
};
use crate::config::ServerConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct NifiClient {
    base_url: String,
    http: Client,
    credentials: Option<(String, String)>,
    token: RwLock<Option<String>>,
    /// Revision client id sent with every write
    client_id: String,
    read_retries: u32,
    type_cache: DashMap<Category, Vec<TypeDescriptor>>,
}

impl NifiClient {
    pub fn new(config: &ServerConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(!config.tls_verify)
            .user_agent(concat!("flowwright/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            credentials,
            token: RwLock::new(None),
            client_id: uuid::Uuid::new_v4().to_string(),
            read_retries: config.read_retries,
            type_cache: DashMap::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch a bearer token when credentials are configured
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> ClientResult<()> {
        let Some((user, password)) = &self.credentials else {
            return Ok(());
        };

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", user)
            .append_pair("password", password)
            .finish();

        let response = self
            .http
            .post(self.url("/access/token"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, text));
        }

        *self.token.write() = Some(text.trim().to_string());
        debug!("Authenticated against {}", self.base_url);
        Ok(())
    }

    async fn request(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let has_token = self.token.read().is_some();
        if self.credentials.is_some() && !has_token {
            self.authenticate().await?;
        }

        let token = self.token.read().clone();
        let mut builder = self.http.request(method, self.url(path));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    /// Send one request; an expired token (HTTP 401) is dropped and the
    /// request is sent once more with a fresh one
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> ClientResult<Value> {
        let mut reauthenticated = false;
        loop {
            let mut builder = self.request(method.clone(), path).await?;
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && self.credentials.is_some() && !reauthenticated {
                debug!(path, "Token rejected, re-authenticating");
                *self.token.write() = None;
                reauthenticated = true;
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                return Err(status_error(status, text));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()));
        }
    }

    /// GET with retries on transport errors
    async fn get(&self, path: &str) -> ClientResult<Value> {
        let mut attempt = 0;
        loop {
            match self.send(Method::GET, path, None).await {
                Err(ClientError::Transport(reason)) if attempt < self.read_retries => {
                    attempt += 1;
                    warn!(path, attempt, "Retrying read after transport error: {}", reason);
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn write(&self, method: Method, path: &str, body: Value) -> ClientResult<Value> {
        self.send(method, path, Some(&body)).await
    }

    fn revision(&self, version: u64) -> Value {
        json!({ "clientId": self.client_id, "version": version })
    }

    async fn current_version(&self, path: &str) -> ClientResult<u64> {
        let entity = self.get(path).await?;
        Ok(entity["revision"]["version"].as_u64().unwrap_or(0))
    }

    async fn delete_versioned(&self, kind: &str, id: &str) -> ClientResult<()> {
        let path = format!("/{}/{}", kind, id);
        let version = self.current_version(&path).await?;
        let path = format!("{}?version={}&clientId={}", path, version, self.client_id);
        self.send(Method::DELETE, &path, None).await.map(|_| ())
    }

    async fn set_run_status(&self, kind: &str, id: &str, state: &str) -> ClientResult<()> {
        let version = self.current_version(&format!("/{}/{}", kind, id)).await?;
        let body = json!({
            "revision": self.revision(version),
            "state": state,
            "disconnectedNodeAcknowledged": false,
        });
        self.write(Method::PUT, &format!("/{}/{}/run-status", kind, id), body)
            .await
            .map(|_| ())
    }

    /// Services defined in `scope` itself; the platform adds ancestor-group
    /// services unless told not to
    async fn list_services(&self, scope: &str) -> ClientResult<Vec<Value>> {
        let body = self
            .get(&format!(
                "/flow/process-groups/{}/controller-services?includeAncestorGroups=false&includeDescendantGroups=false",
                scope
            ))
            .await?;
        Ok(array(&body["controllerServices"]))
    }

    async fn list_units(&self, scope: &str) -> ClientResult<Vec<Value>> {
        let body = self.get(&format!("/process-groups/{}/processors", scope)).await?;
        Ok(array(&body["processors"]))
    }
}

#[async_trait]
impl FlowClient for NifiClient {
    #[instrument(skip(self))]
    async fn list_resource_types(&self, category: Category) -> ClientResult<Vec<TypeDescriptor>> {
        let cached = self.type_cache.get(&category).map(|entry| entry.value().clone());
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let (path, key) = match category {
            Category::Unit => ("/flow/processor-types", "processorTypes"),
            Category::Service => ("/flow/controller-service-types", "controllerServiceTypes"),
            Category::Link => return Ok(Vec::new()),
        };
        let body = self.get(path).await?;
        let types: Vec<TypeDescriptor> = array(&body[key]).iter().map(type_descriptor).collect();

        debug!(count = types.len(), "Fetched {} type catalog", category);
        self.type_cache.insert(category, types.clone());
        Ok(types)
    }

    #[instrument(skip(self))]
    async fn list_resources(
        &self,
        scope: &str,
        category: Category,
    ) -> ClientResult<Vec<ResourceSummary>> {
        let raw = match category {
            Category::Unit => self.list_units(scope).await?,
            Category::Service => self.list_services(scope).await?,
            Category::Link => {
                let body = self.get(&format!("/process-groups/{}/connections", scope)).await?;
                array(&body["connections"])
            }
        };

        Ok(raw
            .iter()
            .map(|v| ResourceSummary {
                id: str_at(&v["id"]),
                name: str_at(&v["component"]["name"]),
                type_name: str_at(&v["component"]["type"]),
                category,
            })
            .collect())
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_service(&self, scope: &str, spec: &ServiceSpec) -> ClientResult<Entity> {
        let body = json!({
            "revision": self.revision(0),
            "component": {
                "type": spec.type_name,
                "name": spec.name,
                "properties": spec.properties,
            }
        });
        let created = self
            .write(
                Method::POST,
                &format!("/process-groups/{}/controller-services", scope),
                body,
            )
            .await?;
        Ok(entity_from(&created))
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_unit(&self, scope: &str, spec: &UnitSpec) -> ClientResult<Entity> {
        let body = json!({
            "revision": self.revision(0),
            "component": {
                "type": spec.type_name,
                "name": spec.name,
                "position": { "x": spec.position.x, "y": spec.position.y },
                "config": { "properties": spec.properties },
            }
        });
        let created = self
            .write(Method::POST, &format!("/process-groups/{}/processors", scope), body)
            .await?;
        Ok(entity_from(&created))
    }

    #[instrument(skip(self, spec))]
    async fn create_link(&self, scope: &str, spec: &LinkSpec) -> ClientResult<Entity> {
        let body = json!({
            "revision": self.revision(0),
            "component": {
                "name": "",
                "source": { "id": spec.source_id, "groupId": scope, "type": "PROCESSOR" },
                "destination": { "id": spec.target_id, "groupId": scope, "type": "PROCESSOR" },
                "selectedRelationships": spec.relationships,
            }
        });
        let created = self
            .write(Method::POST, &format!("/process-groups/{}/connections", scope), body)
            .await?;
        Ok(entity_from(&created))
    }

    #[instrument(skip(self))]
    async fn enable_service(&self, id: &str) -> ClientResult<()> {
        self.set_run_status("controller-services", id, "ENABLED").await
    }

    #[instrument(skip(self))]
    async fn disable_service(&self, id: &str) -> ClientResult<()> {
        self.set_run_status("controller-services", id, "DISABLED").await
    }

    #[instrument(skip(self))]
    async fn delete_service(&self, id: &str) -> ClientResult<()> {
        self.delete_versioned("controller-services", id).await
    }

    #[instrument(skip(self))]
    async fn stop_unit(&self, id: &str) -> ClientResult<()> {
        self.set_run_status("processors", id, "STOPPED").await
    }

    #[instrument(skip(self))]
    async fn delete_unit(&self, id: &str) -> ClientResult<()> {
        self.delete_versioned("processors", id).await
    }

    #[instrument(skip(self))]
    async fn delete_link(&self, id: &str) -> ClientResult<()> {
        self.delete_versioned("connections", id).await
    }

    #[instrument(skip(self))]
    async fn get_unit(&self, id: &str) -> ClientResult<Entity> {
        let body = self.get(&format!("/processors/{}", id)).await?;
        Ok(entity_from(&body))
    }

    #[instrument(skip(self))]
    async fn update_unit_relationships(
        &self,
        id: &str,
        terminated: &[String],
    ) -> ClientResult<Entity> {
        let version = self.current_version(&format!("/processors/{}", id)).await?;
        let body = json!({
            "revision": self.revision(version),
            "component": {
                "id": id,
                "config": { "autoTerminatedRelationships": terminated },
            }
        });
        let updated = self
            .write(Method::PUT, &format!("/processors/{}", id), body)
            .await?;
        Ok(entity_from(&updated))
    }

    #[instrument(skip(self))]
    async fn get_scope_status(&self, scope: &str) -> ClientResult<ScopeStatus> {
        let mut components: Vec<ComponentState> = self
            .list_units(scope)
            .await?
            .iter()
            .map(|v| component_state(v, Category::Unit))
            .collect();
        components.extend(
            self.list_services(scope)
                .await?
                .iter()
                .map(|v| component_state(v, Category::Service)),
        );

        let board = self
            .get(&format!("/flow/bulletin-board?groupId={}", scope))
            .await?;
        let notices = array(&board["bulletinBoard"]["bulletins"])
            .iter()
            .map(|b| {
                let bulletin = &b["bulletin"];
                Notice {
                    level: str_at(&bulletin["level"]),
                    message: str_at(&bulletin["message"]),
                    source_id: bulletin["sourceId"].as_str().map(str::to_string),
                    source_name: bulletin["sourceName"].as_str().map(str::to_string),
                }
            })
            .collect();

        Ok(ScopeStatus {
            components,
            notices,
        })
    }
}

// ============================================================================
// WIRE HELPERS
// ============================================================================

fn status_error(status: StatusCode, body: String) -> ClientError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no body").to_string()
    } else {
        body
    };
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        StatusCode::BAD_REQUEST => ClientError::BadRequest(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        other => ClientError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

fn array(value: &Value) -> Vec<Value> {
    value.as_array().cloned().unwrap_or_default()
}

fn str_at(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn type_descriptor(value: &Value) -> TypeDescriptor {
    let mut descriptor = TypeDescriptor::new(str_at(&value["type"]));
    descriptor.description = str_at(&value["description"]);
    descriptor.tags = strings(&value["tags"]);
    descriptor
}

/// Processor, controller-service and connection entities share this shape
fn entity_from(value: &Value) -> Entity {
    let component = &value["component"];

    // Processors nest properties under config; controller services don't
    let props = if component["config"]["properties"].is_object() {
        &component["config"]["properties"]
    } else {
        &component["properties"]
    };
    let properties = props
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let relationships = array(&component["relationships"])
        .iter()
        .map(|r| RelationshipInfo {
            name: str_at(&r["name"]),
            auto_terminate: r["autoTerminate"].as_bool().unwrap_or(false),
        })
        .collect();

    Entity {
        id: str_at(&value["id"]),
        name: str_at(&component["name"]),
        type_name: component["type"]
            .as_str()
            .unwrap_or("connection")
            .to_string(),
        version: value["revision"]["version"].as_u64().unwrap_or(0),
        validation_status: component["validationStatus"].as_str().map(str::to_string),
        validation_errors: strings(&component["validationErrors"]),
        properties,
        relationships,
    }
}

fn component_state(value: &Value, category: Category) -> ComponentState {
    let component = &value["component"];
    ComponentState {
        id: str_at(&value["id"]),
        name: str_at(&component["name"]),
        category,
        run_state: str_at(&component["state"]),
        validation_status: component["validationStatus"]
            .as_str()
            .unwrap_or("VALID")
            .to_string(),
        validation_errors: strings(&component["validationErrors"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "stale".into()),
            ClientError::Conflict(m) if m == "stale"
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, String::new()),
            ClientError::BadRequest(m) if m == "Bad Request"
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "x".into()),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "x".into()),
            ClientError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn processor_entity_parses() {
        let body = json!({
            "id": "p-1",
            "revision": { "version": 3 },
            "component": {
                "name": "Log",
                "type": "org.apache.nifi.processors.standard.LogAttribute",
                "validationStatus": "INVALID",
                "validationErrors": ["'Relationship success' is invalid"],
                "config": { "properties": { "Log Level": "info", "Unset": null } },
                "relationships": [{ "name": "success", "autoTerminate": true }]
            }
        });

        let entity = entity_from(&body);
        assert_eq!(entity.id, "p-1");
        assert_eq!(entity.version, 3);
        assert_eq!(entity.properties.len(), 1);
        assert_eq!(entity.validation_status.as_deref(), Some("INVALID"));
        assert!(entity.relationships[0].auto_terminate);
    }

    #[test]
    fn service_entity_reads_flat_properties() {
        let body = json!({
            "id": "s-1",
            "revision": { "version": 0 },
            "component": { "name": "Pool", "type": "X", "properties": { "Max": "8" } }
        });
        assert_eq!(entity_from(&body).properties["Max"], "8");
    }
}
