//! Branch types for the kill-switch.
//!
//! This module provides the branch identifier, status and state record kept
//! by the branch registry.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Branch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    /// Create a new branch ID from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, BranchError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(BranchError::InvalidId(id));
        }
        Ok(Self(id))
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BranchId {
    type Error = BranchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for BranchId {
    type Error = BranchError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for BranchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Branch-related errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BranchError {
    /// Branch not found.
    #[error("Branch not found: {0}")]
    BranchNotFound(BranchId),
    /// Branch identifier was rejected.
    #[error("Invalid branch ID: {0:?}")]
    InvalidId(String),
    /// A branch cannot depend on itself.
    #[error("Branch {0} cannot depend on itself")]
    SelfDependency(BranchId),
}

/// Branch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    /// Branch is running or may still run.
    #[default]
    Active,
    /// Branch was killed. Terminal.
    Killed,
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchStatus::Active => write!(f, "active"),
            BranchStatus::Killed => write!(f, "killed"),
        }
    }
}

/// State of one branch as recorded by the registry.
///
/// `killed_at` and `kill_reason` are present exactly when the status is
/// [`BranchStatus::Killed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchState {
    id: BranchId,
    workflow_id: Option<String>,
    status: BranchStatus,
    killed_at: Option<DateTime<Utc>>,
    kill_reason: Option<String>,
    children: Vec<BranchId>,
    registered_at: DateTime<Utc>,
}

impl BranchState {
    /// Creates an active branch, optionally bound to a workflow execution.
    #[must_use]
    pub fn new(id: BranchId, workflow_id: Option<String>) -> Self {
        Self {
            id,
            workflow_id: workflow_id.filter(|w| !w.is_empty()),
            status: BranchStatus::Active,
            killed_at: None,
            kill_reason: None,
            children: Vec::new(),
            registered_at: Utc::now(),
        }
    }

    /// Branch identifier.
    #[must_use]
    pub fn id(&self) -> &BranchId {
        &self.id
    }

    /// Workflow execution backing this branch.
    #[must_use]
    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> BranchStatus {
        self.status
    }

    /// Returns true once the branch has been killed.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.status == BranchStatus::Killed
    }

    /// When the branch was killed.
    #[must_use]
    pub fn killed_at(&self) -> Option<DateTime<Utc>> {
        self.killed_at
    }

    /// Why the branch was killed.
    #[must_use]
    pub fn kill_reason(&self) -> Option<&str> {
        self.kill_reason.as_deref()
    }

    /// Dependent branches, in registration order.
    #[must_use]
    pub fn children(&self) -> &[BranchId] {
        &self.children
    }

    /// When the branch was first registered.
    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Records a dependent branch. Returns false if it was already recorded.
    pub(crate) fn add_child(&mut self, child: BranchId) -> bool {
        if self.children.contains(&child) {
            return false;
        }
        self.children.push(child);
        true
    }

    /// Moves the branch to Killed. Returns false, leaving the original
    /// kill metadata untouched, if it was already killed.
    pub(crate) fn kill(&mut self, reason: String, at: DateTime<Utc>) -> bool {
        if self.is_killed() {
            return false;
        }
        self.status = BranchStatus::Killed;
        self.killed_at = Some(at);
        self.kill_reason = Some(reason);
        true
    }
}

/// Kill statistics maintained by the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KillStats {
    /// Branches moved to Killed.
    pub total_kills: u64,
    /// Kills whose teardown did not finish before the timeout.
    pub degraded_kills: u64,
}

/// Result of asking the registry to kill a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTransition {
    /// This call moved the branch from Active to Killed.
    Killed(BranchState),
    /// The branch was already killed; nothing changed.
    AlreadyKilled(BranchState),
}

impl KillTransition {
    /// State of the branch after the call.
    #[must_use]
    pub fn state(&self) -> &BranchState {
        match self {
            Self::Killed(state) | Self::AlreadyKilled(state) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_id_should_reject_blank_values() {
        assert!(BranchId::new("").is_err());
        assert!(BranchId::new("   ").is_err());
        assert_eq!(BranchId::new("branch-1").unwrap().as_str(), "branch-1");
    }

    #[test]
    fn new_state_should_be_active_without_kill_metadata() {
        let state = BranchState::new(BranchId::new("b").unwrap(), Some(String::new()));
        assert_eq!(state.status(), BranchStatus::Active);
        assert!(state.killed_at().is_none());
        assert!(state.kill_reason().is_none());
        assert!(state.workflow_id().is_none());
    }

    #[test]
    fn kill_should_be_absorbing() {
        let mut state = BranchState::new(BranchId::new("b").unwrap(), None);
        let first_at = Utc::now();
        assert!(state.kill("first".to_string(), first_at));
        assert!(!state.kill("second".to_string(), Utc::now()));

        assert_eq!(state.status(), BranchStatus::Killed);
        assert_eq!(state.killed_at(), Some(first_at));
        assert_eq!(state.kill_reason(), Some("first"));
    }

    #[test]
    fn add_child_should_ignore_duplicates() {
        let mut state = BranchState::new(BranchId::new("root").unwrap(), None);
        let child = BranchId::new("child").unwrap();
        assert!(state.add_child(child.clone()));
        assert!(!state.add_child(child));
        assert_eq!(state.children().len(), 1);
    }
}
