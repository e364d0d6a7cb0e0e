//! Assembly event log
//!
//! Audit trail of one assembly invocation.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: batch / phase / object / rollback levels
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Category;
use crate::runtime::AssemblyPhase;

/// Single event in the assembly log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the invocation started (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // BATCH LEVEL
    // ═══════════════════════════════════════════
    BatchStarted {
        request_id: String,
        scope: String,
        definitions: usize,
    },
    BatchCompleted {
        status: String,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // STATE MACHINE
    // ═══════════════════════════════════════════
    PhaseEntered {
        phase: AssemblyPhase,
    },

    // ═══════════════════════════════════════════
    // OBJECT LEVEL
    // ═══════════════════════════════════════════
    ObjectCreated {
        category: Category,
        name: String,
        id: String,
    },
    ObjectFailed {
        category: Category,
        name: String,
        error: String,
        critical: bool,
    },
    RelationshipsTerminated {
        unit: String,
        relationships: Vec<String>,
    },

    // ═══════════════════════════════════════════
    // COMPENSATION
    // ═══════════════════════════════════════════
    RollbackStarted {
        reason: String,
        ledger_size: usize,
    },
    RollbackCompleted {
        successful: usize,
        failed: usize,
    },
}

impl EventKind {
    /// Name of the object the event is about, if any
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Self::ObjectCreated { name, .. } | Self::ObjectFailed { name, .. } => Some(name),
            Self::RelationshipsTerminated { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.elapsed_ms(),
            kind,
        };

        self.events.write().push(event);
        id
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Phases entered so far, in order
    pub fn phases(&self) -> Vec<AssemblyPhase> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::PhaseEntered { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }

    pub fn filter_object(&self, name: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.object_name() == Some(name))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let log = EventLog::new();
        let a = log.emit(EventKind::PhaseEntered {
            phase: AssemblyPhase::ValidatingTypes,
        });
        let b = log.emit(EventKind::PhaseEntered {
            phase: AssemblyPhase::CheckingDuplicates,
        });
        assert!(b > a);
        assert_eq!(
            log.phases(),
            vec![AssemblyPhase::ValidatingTypes, AssemblyPhase::CheckingDuplicates]
        );
    }

    #[test]
    fn filter_by_object() {
        let log = EventLog::new();
        log.emit(EventKind::ObjectCreated {
            category: Category::Unit,
            name: "Log".into(),
            id: "1".into(),
        });
        log.emit(EventKind::ObjectFailed {
            category: Category::Unit,
            name: "Other".into(),
            error: "boom".into(),
            critical: false,
        });
        assert_eq!(log.filter_object("Log").len(), 1);
    }

    #[test]
    fn clones_share_storage() {
        let log = EventLog::new();
        let clone = log.clone();
        clone.emit(EventKind::RollbackCompleted {
            successful: 1,
            failed: 0,
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.to_json()[0]["kind"]["type"], "rollback_completed");
    }
}
