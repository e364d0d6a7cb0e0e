//! Compensating rollback
//!
//! Deletes what one invocation created, newest first. Objects the batch only
//! resolved to are skipped. Rollback never fails as a whole: every deletion
//! outcome lands in the [`RollbackSummary`].

use serde::Serialize;
use tracing::{info, warn};

use crate::client::Category;
use crate::event::EventKind;

use super::context::InvocationContext;
use super::ledger::{CreatedObjectLedger, LedgerEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    Deleted,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackItem {
    pub category: Category,
    pub id: String,
    pub name: String,
    pub outcome: RollbackOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSummary {
    pub total_objects: usize,
    pub successful_deletions: usize,
    pub failed_deletions: usize,
    pub skipped_preexisting: usize,
    pub results: Vec<RollbackItem>,
}

impl RollbackSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_deletions == 0
    }
}

pub struct RollbackExecutor<'a> {
    ctx: &'a InvocationContext,
}

impl<'a> RollbackExecutor<'a> {
    pub fn new(ctx: &'a InvocationContext) -> Self {
        Self { ctx }
    }

    /// Undo every created object in reverse creation order
    pub async fn rollback(&self, ledger: CreatedObjectLedger, reason: &str) -> RollbackSummary {
        let mut summary = RollbackSummary {
            total_objects: ledger.len(),
            ..Default::default()
        };
        self.ctx.events.emit(EventKind::RollbackStarted {
            reason: reason.to_string(),
            ledger_size: ledger.len(),
        });
        warn!(reason, objects = ledger.len(), "Rolling back created objects");

        for entry in ledger.into_lifo() {
            let item = if entry.preexisting {
                summary.skipped_preexisting += 1;
                RollbackItem::from_entry(entry, RollbackOutcome::Skipped, None)
            } else {
                match self.undo(&entry).await {
                    Ok(()) => {
                        summary.successful_deletions += 1;
                        info!(category = %entry.category, name = %entry.name, "Deleted");
                        RollbackItem::from_entry(entry, RollbackOutcome::Deleted, None)
                    }
                    Err(e) => {
                        summary.failed_deletions += 1;
                        warn!(category = %entry.category, name = %entry.name, error = %e, "Delete failed");
                        RollbackItem::from_entry(entry, RollbackOutcome::Failed, Some(e.to_string()))
                    }
                }
            };
            summary.results.push(item);
        }

        self.ctx.events.emit(EventKind::RollbackCompleted {
            successful: summary.successful_deletions,
            failed: summary.failed_deletions,
        });
        summary
    }

    async fn undo(&self, entry: &LedgerEntry) -> crate::client::ClientResult<()> {
        let client = &self.ctx.client;
        match entry.category {
            Category::Link => client.delete_link(&entry.id).await,
            Category::Unit => {
                if let Err(e) = client.stop_unit(&entry.id).await {
                    warn!(name = %entry.name, error = %e, "Stop before delete failed");
                }
                client.delete_unit(&entry.id).await
            }
            Category::Service => {
                if let Err(e) = client.disable_service(&entry.id).await {
                    warn!(name = %entry.name, error = %e, "Disable before delete failed");
                }
                client.delete_service(&entry.id).await
            }
        }
    }
}

impl RollbackItem {
    fn from_entry(entry: LedgerEntry, outcome: RollbackOutcome, error: Option<String>) -> Self {
        Self {
            category: entry.category,
            id: entry.id,
            name: entry.name,
            outcome,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::{ClientError, FlowClient, MockFlowClient};
    use crate::config::AssemblySettings;

    #[tokio::test]
    async fn deletes_newest_first_and_skips_preexisting() {
        let mock = Arc::new(MockFlowClient::new());
        let existing = mock.add_existing(Category::Unit, "Existing", "X");
        let svc = mock.add_existing(Category::Service, "Pool", "S");
        let unit = mock.add_existing(Category::Unit, "New", "X");

        let mut ledger = CreatedObjectLedger::new();
        ledger.record_created(Category::Service, &svc, "Pool");
        ledger.record_preexisting(Category::Unit, &existing, "Existing");
        ledger.record_created(Category::Unit, &unit, "New");

        let ctx = InvocationContext::new(mock.clone(), AssemblySettings::default());
        let summary = RollbackExecutor::new(&ctx).rollback(ledger, "test").await;

        assert_eq!(summary.total_objects, 3);
        assert_eq!(summary.successful_deletions, 2);
        assert_eq!(summary.skipped_preexisting, 1);
        assert_eq!(mock.object_names(), vec!["Existing"]);
        assert_eq!(mock.targets_of("delete_unit"), vec![unit]);
        assert_eq!(mock.targets_of("disable_service"), vec![svc.clone()]);
        assert_eq!(mock.targets_of("delete_service"), vec![svc]);
    }

    #[tokio::test]
    async fn failed_deletions_are_counted_not_raised() {
        let mock = Arc::new(MockFlowClient::new());
        let a = mock.add_existing(Category::Unit, "A", "X");
        let b = mock.add_existing(Category::Unit, "B", "X");
        mock.fail_on("delete_unit", &b, ClientError::Conflict("stale".into()));

        let mut ledger = CreatedObjectLedger::new();
        ledger.record_created(Category::Unit, &a, "A");
        ledger.record_created(Category::Unit, &b, "B");

        let ctx = InvocationContext::new(mock.clone(), AssemblySettings::default());
        let summary = RollbackExecutor::new(&ctx).rollback(ledger, "test").await;

        assert_eq!(summary.failed_deletions, 1);
        assert_eq!(summary.successful_deletions, 1);
        assert!(!summary.is_clean());
        assert_eq!(summary.results[0].outcome, RollbackOutcome::Failed);
        assert!(mock.get_unit(&b).await.is_ok());
    }
}
