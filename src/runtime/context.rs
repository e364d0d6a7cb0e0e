//! Invocation context
//!
//! Request-scoped state handed explicitly to every component of one
//! assembly run. Nothing in here is shared across invocations.

use std::sync::Arc;

use crate::client::FlowClient;
use crate::config::AssemblySettings;
use crate::event::EventLog;

#[derive(Clone)]
pub struct InvocationContext {
    pub client: Arc<dyn FlowClient>,
    pub settings: AssemblySettings,
    /// Correlation id, attached to the tracing span and the response
    pub request_id: String,
    pub events: EventLog,
}

impl InvocationContext {
    pub fn new(client: Arc<dyn FlowClient>, settings: AssemblySettings) -> Self {
        Self {
            client,
            settings,
            request_id: uuid::Uuid::new_v4().to_string(),
            events: EventLog::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("request_id", &self.request_id)
            .field("settings", &self.settings)
            .field("events", &self.events)
            .finish()
    }
}
