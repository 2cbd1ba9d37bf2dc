//! Audit events as structured log records.

use tracing::{info, warn};

use warden_auth::{AuditEvent, AuditSink};

/// Target every audit record is emitted on.
pub const AUDIT_TARGET: &str = "audit";

/// Writes each [`AuditEvent`] as one `tracing` event on the `audit` target.
///
/// Successful events go out at `INFO`, failed ones at `WARN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let metadata = serde_json::Value::Object(event.metadata.clone());
        let ip_address = event.ip_address.map(|ip| ip.to_string());
        let client_id = event.client_id.map(|c| c.to_string());
        let ip_address = ip_address.as_deref();
        let client_id = client_id.as_deref();

        if event.success {
            info!(
                target: AUDIT_TARGET,
                event_id = %event.id,
                event_type = %event.event_type,
                user_id = %event.user_id,
                client_id,
                ip_address,
                user_agent = event.user_agent.as_deref(),
                %metadata,
                occurred_at = %event.occurred_at,
                success = event.success,
                "{}",
                event.description
            );
        } else {
            warn!(
                target: AUDIT_TARGET,
                event_id = %event.id,
                event_type = %event.event_type,
                user_id = %event.user_id,
                client_id,
                ip_address,
                user_agent = event.user_agent.as_deref(),
                %metadata,
                occurred_at = %event.occurred_at,
                success = event.success,
                "{}",
                event.description
            );
        }
    }
}
