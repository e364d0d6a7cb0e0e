//! Created-object ledger
//!
//! Append-only record of every remote object one invocation touched, in
//! creation order. Objects the batch merely resolved to are recorded as
//! `preexisting` so compensation can skip them. The only way to read the
//! ledger back for compensation is [`CreatedObjectLedger::into_lifo`], which
//! consumes it.

use serde::Serialize;

use crate::client::Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub category: Category,
    pub id: String,
    pub name: String,
    pub preexisting: bool,
}

#[derive(Debug, Default)]
pub struct CreatedObjectLedger {
    entries: Vec<LedgerEntry>,
}

impl CreatedObjectLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an object this invocation created
    pub fn record_created(&mut self, category: Category, id: &str, name: &str) {
        self.entries.push(LedgerEntry {
            category,
            id: id.to_string(),
            name: name.to_string(),
            preexisting: false,
        });
    }

    /// Record a remote object the batch depends on but did not create
    ///
    /// Recorded once per id.
    pub fn record_preexisting(&mut self, category: Category, id: &str, name: &str) {
        if self.entries.iter().any(|e| e.id == id) {
            return;
        }
        self.entries.push(LedgerEntry {
            category,
            id: id.to_string(),
            name: name.to_string(),
            preexisting: true,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries this invocation created
    pub fn created_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.preexisting).count()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Consume the ledger, newest entry first
    pub fn into_lifo(self) -> impl Iterator<Item = LedgerEntry> {
        self.entries.into_iter().rev()
    }
}
