//! Canceller that never contacts a workflow engine.

use async_trait::async_trait;
use chrono::Utc;

use super::canceller::WorkflowCanceller;
use super::types::{CancelError, CancellationMode, CancellationStatus};

/// Canceller that reports every cancellation as an immediate success.
///
/// Holds no state, so it is a safe default when no engine is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCanceller;

impl NoopCanceller {
    /// Create a new no-op canceller.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkflowCanceller for NoopCanceller {
    async fn cancel_workflow(
        &self,
        workflow_id: &str,
        mode: CancellationMode,
    ) -> Result<CancellationStatus, CancelError> {
        let now = Utc::now();
        Ok(CancellationStatus {
            workflow_id: workflow_id.to_string(),
            success: true,
            mode,
            duration: std::time::Duration::ZERO,
            error: None,
            message: format!("no-op {mode} cancellation"),
            requested_at: now,
            completed_at: Some(now),
            resources_freed: Vec::new(),
        })
    }

    fn cancellation_status(&self, _workflow_id: &str) -> Option<CancellationStatus> {
        None
    }

    fn has_pending_cancellation(&self, _workflow_id: &str) -> bool {
        false
    }

    fn clear(&self) {}
}
