use serde::Serialize;
use tracing::{info, info_span};

/// Domain event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The coordinator process started.
    SystemStartup {
        /// Component that started.
        component: String,
    },
    /// The coordinator process is stopping.
    SystemShutdown {
        /// Why it is stopping.
        reason: String,
    },
    /// A branch transitioned to Killed.
    BranchKilled {
        /// Branch that was killed.
        branch_id: String,
        /// Recorded kill reason.
        reason: String,
        /// True when teardown did not finish before the timeout.
        degraded: bool,
    },
    /// A cascading kill finished, cleanly or not.
    CascadeFinished {
        /// Root of the cascade.
        root: String,
        /// Number of branches visited.
        visited: usize,
        /// First error encountered, if any.
        error: Option<String>,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a secure file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    // Serialize to JSON for machine-readable audit logs
    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Audit Event");
}
