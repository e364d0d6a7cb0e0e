//! Name collision detection
//!
//! Names are unique per category inside a scope. A unit and a service may
//! share a name; qualified references tell them apart.

use std::collections::BTreeMap;

use tracing::warn;

use crate::ast::Batch;
use crate::client::Category;
use crate::error::{FixSuggestion, FlowError};
use crate::runtime::{InvocationContext, ValidationFinding};

const RENAME_OR_UPDATE: &str =
    "Rename the new definition, or modify the existing object with an update operation instead";

pub struct DuplicateDetector<'a> {
    ctx: &'a InvocationContext,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(ctx: &'a InvocationContext) -> Self {
        Self { ctx }
    }

    /// Findings for names that already exist in the scope or repeat in the batch
    pub async fn check(&self, batch: &Batch) -> Vec<ValidationFinding> {
        let mut findings = intra_batch(batch);

        for category in [Category::Service, Category::Unit] {
            let names = batch_names(batch, category);
            if names.is_empty() {
                continue;
            }
            let existing = match self.ctx.client.list_resources(&batch.scope, category).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!(%category, error = %e, "Could not list existing objects");
                    let err = FlowError::Remote(e);
                    findings.push(ValidationFinding::error(
                        format!("Could not check {} names for duplicates: {}", category, err),
                        err.fix_suggestion().map(str::to_string),
                    ));
                    continue;
                }
            };
            for name in names {
                if let Some(found) = existing.iter().find(|r| r.name == name) {
                    let err = FlowError::DuplicateName {
                        name: name.to_string(),
                        existing: format!("{} of type {}", category, found.type_name),
                    };
                    findings.push(
                        ValidationFinding::error(err.to_string(), Some(RENAME_OR_UPDATE.to_string()))
                            .about(category, name),
                    );
                }
            }
        }
        findings
    }
}

/// Names defined more than once within one category of the batch
pub fn intra_batch(batch: &Batch) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    for category in [Category::Service, Category::Unit] {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for name in batch_names(batch, category) {
            *seen.entry(name).or_default() += 1;
        }
        for (name, count) in seen.into_iter().filter(|(_, n)| *n > 1) {
            let err = FlowError::DuplicateName {
                name: name.to_string(),
                existing: format!("another {} definition in this batch, {} in total", category, count),
            };
            findings.push(
                ValidationFinding::error(
                    err.to_string(),
                    Some("Give every definition of one kind a distinct name".to_string()),
                )
                .about(category, name),
            );
        }
    }
    findings
}

fn batch_names(batch: &Batch, category: Category) -> Vec<&str> {
    match category {
        Category::Service => batch.services.iter().map(|s| s.name.as_str()).collect(),
        Category::Unit => batch.units.iter().map(|u| u.name.as_str()).collect(),
        Category::Link => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ast::BatchRequest;
    use crate::client::{ClientError, MockFlowClient};
    use crate::config::AssemblySettings;

    const BATCH: &str = r#"
resources:
  - kind: service
    name: Pool
    type: DBCPConnectionPool
  - kind: unit
    name: Log
    type: LogAttribute
"#;

    fn batch(yaml: &str) -> Batch {
        BatchRequest::from_yaml(yaml).unwrap().into_batch(Some("g"), None).unwrap()
    }

    #[tokio::test]
    async fn existing_names_conflict_per_category() {
        let mock = MockFlowClient::new();
        mock.add_existing(Category::Unit, "Log", "org.apache.nifi.processors.standard.LogAttribute");
        // Same name, other category: not a conflict
        mock.add_existing(Category::Unit, "Pool", "X");
        let ctx = InvocationContext::new(Arc::new(mock), AssemblySettings::default());

        let findings = DuplicateDetector::new(&ctx).check(&batch(BATCH)).await;
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("'Log'"));
        assert!(findings[0].message.contains("LogAttribute"));
        assert!(findings[0].recommendation.as_deref().unwrap().contains("update"));
    }

    #[tokio::test]
    async fn listing_failure_fails_closed() {
        let mock = MockFlowClient::new();
        mock.fail_listing(ClientError::Unauthorized("token expired".into()));
        let ctx = InvocationContext::new(Arc::new(mock), AssemblySettings::default());
        let findings = DuplicateDetector::new(&ctx).check(&batch(BATCH)).await;
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.is_error()));
    }

    #[test]
    fn repeated_names_within_batch() {
        let findings = intra_batch(&batch(
            r#"
resources:
  - { kind: unit, name: A, type: LogAttribute }
  - { kind: unit, name: A, type: LogAttribute }
  - { kind: service, name: A, type: DBCPConnectionPool }
"#,
        ));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("another unit definition"));
    }
}
