//! Teardown reporting and error types for branch kills.

use std::time::Duration;

use crate::branch_manager::{BranchError, BranchId};
use crate::workflow::{CancelError, CancellationStatus};

/// What happened while tearing one branch down.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Outcome of cancelling the branch's workflow. `None` when the branch has
    /// no workflow or no canceller is configured.
    pub cancellation: Option<Result<CancellationStatus, CancelError>>,
    /// Names of teardown hooks that reported a failure.
    pub failed_hooks: Vec<String>,
}

impl TeardownReport {
    /// Returns true if every teardown step that ran succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        let cancelled = match &self.cancellation {
            None => true,
            Some(Ok(status)) => status.success,
            Some(Err(_)) => false,
        };
        cancelled && self.failed_hooks.is_empty()
    }

    /// Short description of the workflow cancellation outcome for logs.
    #[must_use]
    pub fn cancellation_summary(&self) -> String {
        match &self.cancellation {
            None => "skipped".to_string(),
            Some(Ok(status)) if status.success => "succeeded".to_string(),
            Some(Ok(status)) => status
                .error
                .clone()
                .unwrap_or_else(|| "failed".to_string()),
            Some(Err(e)) => e.to_string(),
        }
    }
}

/// Errors returned by kill operations.
///
/// A [`KillError::Timeout`] still leaves the branch Killed in the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KillError {
    /// The branch was never registered.
    #[error("Branch not found: {0}")]
    BranchNotFound(BranchId),
    /// Teardown did not finish in time; the branch was marked Killed anyway.
    #[error("Branch {branch_id} killed but teardown timed out after {timeout:?}; cleanup may be incomplete")]
    Timeout {
        /// The branch whose teardown timed out.
        branch_id: BranchId,
        /// The per-branch timeout that was exceeded.
        timeout: Duration,
    },
    /// The cascade as a whole ran out of time.
    #[error("Cascade from {root} timed out after {timeout:?}")]
    CascadeTimeout {
        /// Root of the cascade.
        root: BranchId,
        /// The cascade bound that was exceeded.
        timeout: Duration,
    },
    /// Registry error.
    #[error("Branch error: {0}")]
    Branch(#[from] BranchError),
}
