//! Property correction pipeline
//!
//! Applied to every unit before creation, in order:
//!
//! 1. remove or remap properties the type does not declare
//! 2. fill in required properties
//! 3. canonicalize mistaken enum values
//! 4. resolve references to other objects
//! 5. validate and correct expressions
//!
//! Errors block creation of the owning unit only.

use strsim::normalized_levenshtein;
use tracing::{debug, warn};

use crate::ast::PropertyMap;
use crate::client::{short_type_name, Category};
use crate::el;
use crate::error::FlowError;
use crate::resolve::{looks_like_reference, BatchMaps, ReferenceResolver, Resolution};

use super::registry::{schema_for, Dynamic, Requirement, SchemaRecord};

/// Minimum name similarity for remapping a reference-valued property
const REMAP_SIMILARITY: f64 = 0.4;

/// Remote object a corrected property now points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub category: Category,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct Correction {
    pub properties: PropertyMap,
    pub warnings: Vec<String>,
    pub errors: Vec<FlowError>,
    pub unresolved_references: Vec<String>,
    /// Property name → resolution, for every reference that resolved
    pub resolved: Vec<(String, Resolution)>,
    pub external: Vec<ExternalReference>,
}

impl Correction {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn warn(&mut self, message: String) {
        debug!(%message, "Property correction");
        self.warnings.push(message);
    }

    fn record_external(&mut self, reference: ExternalReference) {
        if !self.external.iter().any(|e| e.id == reference.id) {
            self.external.push(reference);
        }
    }

    fn record_resolution(&mut self, property: &str, resolution: Resolution) {
        if let crate::resolve::ResolutionSource::Remote { category, name } = &resolution.source {
            self.record_external(ExternalReference {
                category: *category,
                id: resolution.value.clone(),
                name: name.clone(),
            });
        }
        self.resolved.push((property.to_string(), resolution));
    }
}

/// Service chosen for a missing required service property
struct ServiceMatch {
    id: String,
    name: String,
    remote: bool,
}

pub struct PropertyCorrector<'r, 'c> {
    resolver: &'r ReferenceResolver<'c>,
}

impl<'r, 'c> PropertyCorrector<'r, 'c> {
    pub fn new(resolver: &'r ReferenceResolver<'c>) -> Self {
        Self { resolver }
    }

    /// Run the full pipeline for one unit
    pub async fn correct(&self, unit_type: &str, raw: &PropertyMap, maps: &BatchMaps) -> Correction {
        let mut out = Correction::default();
        let schema = schema_for(unit_type);
        let type_label = short_type_name(unit_type);

        out.properties = match schema {
            Some(schema) => {
                let mut props = normalize_names(schema, type_label, raw, &mut out);
                self.fill_required(schema, &mut props, maps, &mut out).await;
                canonicalize_values(schema, &mut props, &mut out);
                props
            }
            None => raw.clone(),
        };

        self.resolve_references(&mut out, maps).await;
        correct_expressions(schema, &mut out);

        if !out.is_ok() {
            warn!(unit_type = type_label, errors = out.errors.len(), "Properties not correctable");
        }
        out
    }

    /// Reference resolution only, for service properties
    pub async fn resolve_only(&self, raw: &PropertyMap, maps: &BatchMaps) -> Correction {
        let mut out = Correction {
            properties: raw.clone(),
            ..Default::default()
        };
        self.resolve_references(&mut out, maps).await;
        out
    }

    // ─────────────────────────────────────────────────────────────
    // Step 2: required properties
    // ─────────────────────────────────────────────────────────────

    async fn fill_required(
        &self,
        schema: &SchemaRecord,
        props: &mut PropertyMap,
        maps: &BatchMaps,
        out: &mut Correction,
    ) {
        for (name, requirement) in schema.required {
            if props.get(*name).is_some_and(|v| !v.trim().is_empty()) {
                continue;
            }
            match requirement {
                Requirement::Default(value) => {
                    props.insert(name.to_string(), value.to_string());
                    out.warn(format!("Set missing required property '{}' to default '{}'", name, value));
                }
                Requirement::Mandatory => {
                    out.warn(format!("Required property '{}' is not set", name));
                }
                Requirement::Service {
                    interface,
                    type_hint,
                } => match self.compatible_service(interface, maps).await {
                    Some(found) => {
                        props.insert(name.to_string(), found.id.clone());
                        out.warn(format!(
                            "Added missing required service reference '{}' -> '{}'",
                            name, found.name
                        ));
                        if found.remote {
                            out.record_external(ExternalReference {
                                category: Category::Service,
                                id: found.id,
                                name: found.name,
                            });
                        }
                    }
                    None => out.warn(format!(
                        "Missing required service reference '{}': create {} and reference it as @{}",
                        name, type_hint, interface
                    )),
                },
            }
        }
    }

    /// The one existing service implementing `interface`, batch first
    async fn compatible_service(&self, interface: &str, maps: &BatchMaps) -> Option<ServiceMatch> {
        let needle = interface.to_lowercase();
        let mut local: Vec<ServiceMatch> = maps
            .services
            .iter()
            .filter(|(_, entry)| short_type_name(&entry.type_name).to_lowercase().contains(&needle))
            .map(|(name, entry)| ServiceMatch {
                id: entry.id.clone(),
                name: name.clone(),
                remote: false,
            })
            .collect();
        if local.len() == 1 {
            return local.pop();
        }
        if !local.is_empty() {
            return None;
        }

        let remote = self.resolver.services_of_type(interface).await.ok()?;
        match remote.as_slice() {
            [only] => Some(ServiceMatch {
                id: only.id.clone(),
                name: only.name.clone(),
                remote: true,
            }),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Step 4: references
    // ─────────────────────────────────────────────────────────────

    async fn resolve_references(&self, out: &mut Correction, maps: &BatchMaps) {
        let candidates: Vec<(String, String)> = out
            .properties
            .iter()
            .filter(|(_, v)| looks_like_reference(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (property, value) in candidates {
            match self.resolver.resolve(&value, maps).await {
                Ok(resolution) if resolution.resolved => {
                    if resolution.value != value.trim() {
                        debug!(%property, reference = %value, id = %resolution.value, "Resolved reference");
                    }
                    out.properties.insert(property.clone(), resolution.value.clone());
                    out.record_resolution(&property, resolution);
                }
                Ok(_) => {
                    out.unresolved_references.push(value.clone());
                    out.errors.push(FlowError::UnresolvedReference { reference: value });
                }
                Err(e) => {
                    out.unresolved_references.push(value);
                    out.errors.push(e);
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Step 1: property names
// ─────────────────────────────────────────────────────────────

fn normalize_names(
    schema: &SchemaRecord,
    type_label: &str,
    raw: &PropertyMap,
    out: &mut Correction,
) -> PropertyMap {
    let mut props = PropertyMap::new();
    let mut pending_remaps = Vec::new();

    for (name, value) in raw {
        if let Some(reason) = schema.rejection(name) {
            out.warn(format!(
                "Removed invalid property '{}' for {}: {}",
                name, type_label, reason
            ));
            continue;
        }
        if let Some(declared) = schema.declared(name) {
            if schema.clear_when_empty.contains(&declared) && value.trim().is_empty() {
                out.warn(format!("Removed empty property '{}' (leave it unset instead)", declared));
                continue;
            }
            if declared != name {
                out.warn(format!("Renamed property '{}' to '{}'", name, declared));
            }
            props.insert(declared.to_string(), value.clone());
            continue;
        }
        if let Some(target) = schema.alias_for(name) {
            out.warn(format!("Renamed property '{}' to '{}'", name, target));
            props.insert(target.to_string(), value.clone());
            continue;
        }
        if schema.dynamic != Dynamic::None {
            props.insert(name.clone(), value.clone());
            continue;
        }
        if looks_like_reference(value) {
            pending_remaps.push((name, value));
            continue;
        }
        out.warn(format!("Removed invalid property '{}' for {}", name, type_label));
    }

    for (name, value) in pending_remaps {
        match most_similar_service_property(schema, name, &props) {
            Some(target) => {
                out.warn(format!("Remapped reference property '{}' to '{}'", name, target));
                props.insert(target.to_string(), value.clone());
            }
            None => out.warn(format!("Removed invalid property '{}' for {}", name, type_label)),
        }
    }
    props
}

fn most_similar_service_property(
    schema: &SchemaRecord,
    name: &str,
    taken: &PropertyMap,
) -> Option<&'static str> {
    let lowered = name.to_lowercase();
    schema
        .service_properties
        .iter()
        .filter(|p| !taken.contains_key(**p))
        .map(|p| (*p, normalized_levenshtein(&lowered, &p.to_lowercase())))
        .filter(|(_, score)| *score >= REMAP_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(p, _)| p)
}

// ─────────────────────────────────────────────────────────────
// Step 3: enum values
// ─────────────────────────────────────────────────────────────

fn canonicalize_values(schema: &SchemaRecord, props: &mut PropertyMap, out: &mut Correction) {
    for (name, value) in props.iter_mut() {
        let Some(allowed) = schema.allowed(name) else {
            continue;
        };
        if allowed.contains(&value.as_str()) || el::contains_expression(value) {
            continue;
        }
        let canonical = schema
            .value_alias(name, value)
            .or_else(|| allowed.iter().find(|a| a.eq_ignore_ascii_case(value)).copied());
        match canonical {
            Some(canonical) => {
                out.warnings.push(format!(
                    "Corrected value of '{}' from '{}' to '{}'",
                    name, value, canonical
                ));
                *value = canonical.to_string();
            }
            None => out.errors.push(FlowError::InvalidProperty {
                property: name.clone(),
                reason: format!("'{}' is not one of: {}", value, allowed.join(", ")),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Step 5: expressions
// ─────────────────────────────────────────────────────────────

/// Expression check for one property value; `None` when it holds no expression
///
/// Routing conditions get boolean folding across `${}` boundaries, every
/// other value is treated as a string template.
pub fn check_expression(
    schema: Option<&SchemaRecord>,
    property: &str,
    value: &str,
) -> Option<el::ElCorrection> {
    let flagged = schema.is_some_and(|s| s.is_expression(property));
    if !flagged && !el::contains_expression(value) {
        return None;
    }
    if schema.is_some_and(|s| s.is_condition(property)) {
        Some(el::correct_condition(value))
    } else {
        Some(el::correct(value))
    }
}

fn correct_expressions(schema: Option<&SchemaRecord>, out: &mut Correction) {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for (name, value) in out.properties.iter_mut() {
        let Some(result) = check_expression(schema, name, value) else {
            continue;
        };
        warnings.extend(result.warnings.iter().map(|w| format!("{}: {}", name, w)));
        if result.is_ok() {
            *value = result.value;
        } else {
            errors.extend(result.errors.into_iter().map(|details| FlowError::Expression {
                property: name.clone(),
                details,
            }));
        }
    }

    out.warnings.extend(warnings);
    out.errors.extend(errors);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::MockFlowClient;
    use crate::config::AssemblySettings;
    use crate::runtime::InvocationContext;

    fn props(pairs: &[(&str, &str)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn ctx(mock: MockFlowClient) -> InvocationContext {
        InvocationContext::new(Arc::new(mock), AssemblySettings::default())
    }

    #[tokio::test]
    async fn http_request_gets_fixed_in_one_pass() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let mut maps = BatchMaps::default();
        maps.services.insert(
            "HttpContextMap",
            "88a1e773-0197-1000-d97d-6f168dc293e0",
            "org.apache.nifi.http.StandardHttpContextMap",
        );

        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "org.apache.nifi.processors.standard.HandleHttpRequest",
                &props(&[("Listening Port", "7070"), ("Base Path", "/order")]),
                &maps,
            )
            .await;

        assert!(fixed.is_ok());
        assert!(!fixed.properties.contains_key("Base Path"));
        assert_eq!(
            fixed.properties["HTTP Context Map"],
            "88a1e773-0197-1000-d97d-6f168dc293e0"
        );
        assert!(fixed
            .warnings
            .iter()
            .any(|w| w.contains("invalid property 'Base Path'")));
        assert!(fixed
            .warnings
            .iter()
            .any(|w| w.contains("Added missing required service reference")));
    }

    #[tokio::test]
    async fn remote_service_filled_in_is_reported_as_external() {
        let mock = MockFlowClient::new();
        let id = mock.add_existing(
            Category::Service,
            "SharedContext",
            "org.apache.nifi.http.StandardHttpContextMap",
        );
        let ctx = ctx(mock);
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct("HandleHttpResponse", &props(&[]), &BatchMaps::default())
            .await;

        assert_eq!(fixed.properties["HTTP Context Map"], id);
        assert_eq!(
            fixed.external,
            vec![ExternalReference {
                category: Category::Service,
                id,
                name: "SharedContext".into(),
            }]
        );
    }

    #[tokio::test]
    async fn symbolic_service_suggestion_is_not_applied() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct("HandleHttpResponse", &props(&[("Response Code", "201")]), &BatchMaps::default())
            .await;

        assert_eq!(fixed.properties["HTTP Status Code"], "201");
        assert!(!fixed.properties.contains_key("HTTP Context Map"));
        assert!(fixed
            .warnings
            .iter()
            .any(|w| w.contains("create org.apache.nifi.http.StandardHttpContextMap")));
    }

    #[tokio::test]
    async fn references_resolve_or_fail_the_unit() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let mut maps = BatchMaps::default();
        maps.services.insert("Map", "11111111-0000-4000-8000-000000000001", "StandardHttpContextMap");

        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "HandleHttpResponse",
                &props(&[("HTTP Context Map", "@Map"), ("HTTP Status Code", "200")]),
                &maps,
            )
            .await;
        assert!(fixed.is_ok());
        assert_eq!(fixed.properties["HTTP Context Map"], "11111111-0000-4000-8000-000000000001");

        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "HandleHttpResponse",
                &props(&[("HTTP Context Map", "@NonExistentService")]),
                &BatchMaps::default(),
            )
            .await;
        assert!(!fixed.is_ok());
        assert_eq!(fixed.unresolved_references, vec!["@NonExistentService"]);
    }

    #[tokio::test]
    async fn enum_aliases_and_case_are_canonicalized() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "PutFile",
                &props(&[("Directory", "/tmp/out"), ("Conflict Resolution Strategy", "overwrite")]),
                &BatchMaps::default(),
            )
            .await;
        assert_eq!(fixed.properties["Conflict Resolution Strategy"], "replace");
        assert_eq!(fixed.properties["Create Missing Directories"], "true");

        let fixed = PropertyCorrector::new(&resolver)
            .correct("LogAttribute", &props(&[("Log Level", "DEBUG")]), &BatchMaps::default())
            .await;
        assert_eq!(fixed.properties["Log Level"], "debug");

        let fixed = PropertyCorrector::new(&resolver)
            .correct("LogAttribute", &props(&[("Log Level", "loud")]), &BatchMaps::default())
            .await;
        assert!(matches!(fixed.errors[0], FlowError::InvalidProperty { .. }));
    }

    #[tokio::test]
    async fn expressions_are_corrected_in_dynamic_properties() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "RouteOnAttribute",
                &props(&[("valid", "${userId:isEmpty():not() and orderId:isEmpty():not()}")]),
                &BatchMaps::default(),
            )
            .await;
        assert!(fixed.is_ok());
        assert_eq!(
            fixed.properties["valid"],
            "${userId:isEmpty():not():and(${orderId:isEmpty():not()})}"
        );
        assert!(fixed
            .warnings
            .iter()
            .any(|w| w.contains("Auto-corrected EL logical operators")));
        assert_eq!(fixed.properties["Routing Strategy"], "Route to Property name");
    }

    #[tokio::test]
    async fn routing_conditions_fold_operators_between_expressions() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "RouteOnAttribute",
                &props(&[("both", "${a:notNull()} and ${b:notNull()}")]),
                &BatchMaps::default(),
            )
            .await;
        assert!(fixed.is_ok());
        assert_eq!(fixed.properties["both"], "${a:notNull():and(${b:notNull()})}");
    }

    #[tokio::test]
    async fn string_templates_are_not_read_as_logic() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "UpdateAttribute",
                &props(&[("full.name", "${first} and ${last}"), ("pair", "${a} not ${b}")]),
                &BatchMaps::default(),
            )
            .await;
        assert!(fixed.is_ok(), "{:?}", fixed.errors);
        assert_eq!(fixed.properties["full.name"], "${first} and ${last}");
        assert_eq!(fixed.properties["pair"], "${a} not ${b}");
    }

    #[tokio::test]
    async fn uncorrectable_expressions_block_the_unit() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct("UpdateAttribute", &props(&[("x", "${toUpper(filename)}")]), &BatchMaps::default())
            .await;
        assert!(matches!(fixed.errors[0], FlowError::Expression { .. }));
    }

    #[tokio::test]
    async fn empty_script_paths_are_cleared() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "org.apache.nifi.processors.script.ExecuteScript",
                &props(&[("Script Engine", "Groovy"), ("Script File", ""), ("Module Directory", " ")]),
                &BatchMaps::default(),
            )
            .await;
        assert!(!fixed.properties.contains_key("Script File"));
        assert!(!fixed.properties.contains_key("Module Directory"));
        assert_eq!(fixed.warnings.len(), 2);
    }

    #[tokio::test]
    async fn reference_values_remap_to_similar_service_property() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let mut maps = BatchMaps::default();
        maps.services.insert("Ctx", "22222222-0000-4000-8000-000000000002", "StandardHttpContextMap");
        let fixed = PropertyCorrector::new(&resolver)
            .correct(
                "HandleHttpRequest",
                &props(&[("HTTP Context", "@Ctx"), ("Listening Port", "8081")]),
                &maps,
            )
            .await;
        assert_eq!(fixed.properties["HTTP Context Map"], "22222222-0000-4000-8000-000000000002");
        assert!(fixed.warnings.iter().any(|w| w.contains("Remapped")));
    }

    #[tokio::test]
    async fn unknown_types_keep_their_properties() {
        let ctx = ctx(MockFlowClient::new());
        let resolver = ReferenceResolver::new(&ctx, "g");
        let fixed = PropertyCorrector::new(&resolver)
            .correct("com.example.Custom", &props(&[("Anything", "${fileName}")]), &BatchMaps::default())
            .await;
        assert_eq!(fixed.properties["Anything"], "${filename}");
    }
}
