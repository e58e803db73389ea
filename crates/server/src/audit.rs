use progear_core::{AuditEvent, AuditSink};
use tracing::info;

/// Writes audit events to the structured log. Nothing is persisted.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            event_name = "audit.event.recorded",
            correlation_id = %event.correlation_id,
            agent_id = %event.actor,
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = %metadata,
            "audit event recorded"
        );
    }
}
