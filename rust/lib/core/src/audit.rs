//! Fire-and-forget audit sink.
//!
//! Modules emit one [`AuditEvent`] per committed state change. Sinks must
//! not fail the caller: delivery problems are theirs to log and drop.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

/// A single committed business event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Owning module, e.g. `"workflow"` or `"rma"`.
    pub module: &'static str,
    /// Entity kind within the module, e.g. `"task"` or `"batch"`.
    pub entity: &'static str,
    pub entity_id: String,
    /// Action name, e.g. `"start"` or `"finalize"`.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: String,
}

impl AuditEvent {
    pub fn new(
        module: &'static str,
        entity: &'static str,
        entity_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            module,
            entity,
            entity_id: entity_id.into(),
            action: action.into(),
            detail: None,
            at: crate::now_rfc3339(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receiver for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes every event to the `audit` tracing target.
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            module = event.module,
            entity = event.entity,
            entity_id = %event.entity_id,
            action = %event.action,
            detail = event.detail.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Keeps events in memory. Used by tests.
#[derive(Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
