//! Cancellation types for the workflow subsystem.
//!
//! This module provides the cancellation mode, the per-attempt status record
//! and the validation errors shared by every canceller.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How urgently a workflow should be stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationMode {
    /// Cooperative shutdown with cleanup, bounded by the longer timeout.
    #[default]
    Graceful,
    /// Immediate termination, bounded by the shorter timeout.
    Force,
}

impl CancellationMode {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for CancellationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CancellationMode {
    type Err = CancelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graceful" => Ok(Self::Graceful),
            "force" => Ok(Self::Force),
            other => Err(CancelError::InvalidMode(other.to_string())),
        }
    }
}

/// Validation errors rejected before any cancellation attempt is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// The workflow identifier was empty.
    #[error("workflow ID cannot be empty")]
    EmptyWorkflowId,
    /// The cancellation mode was not recognised.
    #[error("invalid cancellation mode: {0:?} (expected \"graceful\" or \"force\")")]
    InvalidMode(String),
}

/// Checks that a workflow identifier can be sent to the engine.
///
/// # Errors
///
/// Returns [`CancelError::EmptyWorkflowId`] if the identifier is empty.
pub fn validate_workflow_id(workflow_id: &str) -> Result<(), CancelError> {
    if workflow_id.is_empty() {
        return Err(CancelError::EmptyWorkflowId);
    }
    Ok(())
}

/// Outcome of one cancellation attempt.
///
/// A status is pending until `completed_at` is set; after that it is never
/// modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationStatus {
    /// Workflow the attempt targeted.
    pub workflow_id: String,
    /// Whether the engine confirmed the cancellation in time.
    pub success: bool,
    /// Mode the attempt used.
    pub mode: CancellationMode,
    /// Time spent waiting on the engine.
    pub duration: Duration,
    /// Failure description, present iff the attempt did not succeed.
    pub error: Option<String>,
    /// Human-readable summary.
    pub message: String,
    /// When the attempt was requested.
    pub requested_at: DateTime<Utc>,
    /// When the attempt concluded; absent while pending.
    pub completed_at: Option<DateTime<Utc>>,
    /// Resources the engine reported as freed, in engine order.
    pub resources_freed: Vec<String>,
}

impl CancellationStatus {
    /// Creates a pending status for an attempt that is starting now.
    #[must_use]
    pub fn pending(workflow_id: impl Into<String>, mode: CancellationMode) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            success: false,
            mode,
            duration: Duration::ZERO,
            error: None,
            message: format!("{mode} cancellation in progress"),
            requested_at: Utc::now(),
            completed_at: None,
            resources_freed: Vec::new(),
        }
    }

    /// Creates a concluded status for a request that never reached the engine.
    #[must_use]
    pub fn rejected(
        workflow_id: impl Into<String>,
        mode: CancellationMode,
        error: impl fmt::Display,
    ) -> Self {
        let error = error.to_string();
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            success: false,
            mode,
            duration: Duration::ZERO,
            message: format!("{mode} cancellation rejected: {error}"),
            error: Some(error),
            requested_at: now,
            completed_at: Some(now),
            resources_freed: Vec::new(),
        }
    }

    /// Returns true while the attempt has not concluded.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Concludes the attempt as successful.
    #[must_use]
    pub fn succeeded(mut self, duration: Duration, resources_freed: Vec<String>) -> Self {
        self.success = true;
        self.error = None;
        self.duration = duration;
        self.message = format!(
            "workflow {} cancelled ({}) in {duration:?}",
            self.workflow_id, self.mode
        );
        self.resources_freed = resources_freed;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Concludes the attempt as failed.
    #[must_use]
    pub fn failed(mut self, duration: Duration, error: impl Into<String>) -> Self {
        let error = error.into();
        self.success = false;
        self.duration = duration;
        self.message = format!(
            "{} cancellation of workflow {} failed: {error}",
            self.mode, self.workflow_id
        );
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        self
    }

    /// Concludes the attempt as timed out after `limit`.
    #[must_use]
    pub fn timed_out(self, duration: Duration, limit: Duration) -> Self {
        let mode = self.mode;
        self.failed(
            duration,
            format!("{mode} cancellation timed out after {limit:?}"),
        )
    }
}
