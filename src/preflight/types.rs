//! Type validation against the platform catalogs
//!
//! Every service and unit type in a batch must name a type the platform
//! knows. A short name (`LogAttribute`) matching exactly one catalog entry is
//! accepted and canonicalized to its fully qualified name.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::ast::Batch;
use crate::client::{short_type_name, Category, TypeDescriptor};
use crate::error::FlowError;
use crate::runtime::{InvocationContext, ValidationFinding};

/// Outcome of type validation
#[derive(Debug, Clone, Default)]
pub struct TypeCheck {
    pub valid: bool,
    pub findings: Vec<ValidationFinding>,
    canonical: BTreeMap<(Category, String), String>,
}

impl TypeCheck {
    /// Fully qualified name for a requested type (the request itself when unknown)
    pub fn canonical<'a>(&'a self, category: Category, requested: &'a str) -> &'a str {
        self.canonical
            .get(&(category, requested.to_string()))
            .map(String::as_str)
            .unwrap_or(requested)
    }
}

pub struct TypeValidator<'a> {
    ctx: &'a InvocationContext,
}

impl<'a> TypeValidator<'a> {
    pub fn new(ctx: &'a InvocationContext) -> Self {
        Self { ctx }
    }

    pub async fn validate(&self, batch: &Batch) -> TypeCheck {
        let mut check = TypeCheck {
            valid: true,
            ..Default::default()
        };

        let requests: Vec<(Category, &str, &str)> = batch
            .services
            .iter()
            .map(|s| (Category::Service, s.name.as_str(), s.type_name.as_str()))
            .chain(
                batch
                    .units
                    .iter()
                    .map(|u| (Category::Unit, u.name.as_str(), u.type_name.as_str())),
            )
            .collect();

        for category in [Category::Service, Category::Unit] {
            if !requests.iter().any(|(c, _, _)| *c == category) {
                continue;
            }
            let catalog = match self.ctx.client.list_resource_types(category).await {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!(%category, error = %e, "Type catalog unavailable");
                    let err = FlowError::TypeCatalogUnavailable {
                        category: category.to_string(),
                        reason: e.to_string(),
                    };
                    check.valid = false;
                    check.findings.push(ValidationFinding::from_error(&err));
                    continue;
                }
            };
            debug!(%category, types = catalog.len(), "Fetched type catalog");

            for (_, name, requested) in requests.iter().filter(|(c, _, _)| *c == category) {
                match lookup(&catalog, requested) {
                    Some(canonical) => {
                        check
                            .canonical
                            .insert((category, requested.to_string()), canonical.to_string());
                    }
                    None => {
                        check.valid = false;
                        check.findings.push(self.unknown(category, name, requested, &catalog));
                    }
                }
            }
        }
        check
    }

    fn unknown(
        &self,
        category: Category,
        name: &str,
        requested: &str,
        catalog: &[TypeDescriptor],
    ) -> ValidationFinding {
        let err = FlowError::UnknownType {
            category: category.to_string(),
            type_name: requested.to_string(),
        };
        let similar = suggestions(requested, catalog, self.ctx.settings.type_suggestion_limit);
        let recommendation = if similar.is_empty() {
            format!("No similar {} types found; check the catalog for '{}'", category, name)
        } else {
            format!("Did you mean: {}", similar.join(", "))
        };
        ValidationFinding::error(format!("{} (in '{}')", err, name), Some(recommendation)).about(category, name)
    }
}

/// Exact type name, or a short name matching exactly one entry
fn lookup<'c>(catalog: &'c [TypeDescriptor], requested: &str) -> Option<&'c str> {
    if let Some(exact) = catalog.iter().find(|t| t.type_name == requested) {
        return Some(&exact.type_name);
    }
    let short = short_type_name(requested);
    let mut by_short = catalog.iter().filter(|t| {
        short_type_name(&t.type_name).eq_ignore_ascii_case(short) || t.title.eq_ignore_ascii_case(short)
    });
    match (by_short.next(), by_short.next()) {
        (Some(only), None) => Some(&only.type_name),
        _ => None,
    }
}

fn suggestions(requested: &str, catalog: &[TypeDescriptor], limit: usize) -> Vec<String> {
    let needle = short_type_name(requested).to_lowercase();
    catalog
        .iter()
        .filter(|t| {
            let title = t.title.to_lowercase();
            title.contains(&needle)
                || t.type_name.to_lowercase().contains(&needle)
                || t.description.to_lowercase().contains(&needle)
                || t.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
                || (!title.is_empty() && needle.contains(&title))
        })
        .take(limit)
        .map(|t| t.type_name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::BatchRequest;
    use crate::client::{ClientError, MockFlowClient};
    use crate::config::AssemblySettings;

    fn batch(yaml: &str) -> Batch {
        BatchRequest::from_yaml(yaml).unwrap().into_batch(Some("g"), None).unwrap()
    }

    #[tokio::test]
    async fn short_names_are_canonicalized() {
        let ctx = InvocationContext::new(
            Arc::new(MockFlowClient::with_standard_types()),
            AssemblySettings::default(),
        );
        let batch = batch("resources:\n  - kind: unit\n    name: Log\n    type: LogAttribute\n");
        let check = TypeValidator::new(&ctx).validate(&batch).await;
        assert!(check.valid);
        assert_eq!(
            check.canonical(Category::Unit, "LogAttribute"),
            "org.apache.nifi.processors.standard.LogAttribute"
        );
    }

    #[tokio::test]
    async fn unknown_type_gets_capped_suggestions() {
        let mut mock = MockFlowClient::new();
        for i in 0..8 {
            mock = mock.with_unit_type(TypeDescriptor::new(format!("org.example.PutRecord{}", i)));
        }
        let ctx = InvocationContext::new(Arc::new(mock), AssemblySettings::default());
        let batch = batch("resources:\n  - kind: unit\n    name: P\n    type: org.example.Put\n");

        let check = TypeValidator::new(&ctx).validate(&batch).await;
        assert!(!check.valid);
        assert_eq!(check.findings.len(), 1);
        let recommendation = check.findings[0].recommendation.clone().unwrap();
        assert_eq!(recommendation.matches("PutRecord").count(), 5);
        assert!(check.findings[0].message.contains("FLW-011"));
    }

    #[tokio::test]
    async fn catalog_failure_fails_closed() {
        let mock = MockFlowClient::with_standard_types();
        mock.fail_catalog(Category::Service, ClientError::Transport("down".into()));
        let ctx = InvocationContext::new(Arc::new(mock), AssemblySettings::default());
        let batch = batch(
            "resources:\n  - kind: service\n    name: Map\n    type: StandardHttpContextMap\n",
        );
        let check = TypeValidator::new(&ctx).validate(&batch).await;
        assert!(!check.valid);
        assert!(check.findings[0].message.contains("FLW-013"));
    }

    #[tokio::test]
    async fn unused_categories_are_not_fetched() {
        let mock = Arc::new(MockFlowClient::with_standard_types());
        let ctx = InvocationContext::new(mock.clone(), AssemblySettings::default());
        let batch = batch("resources:\n  - kind: unit\n    name: Log\n    type: LogAttribute\n");
        TypeValidator::new(&ctx).validate(&batch).await;
        assert_eq!(mock.targets_of("list_resource_types"), vec!["unit"]);
    }
}
