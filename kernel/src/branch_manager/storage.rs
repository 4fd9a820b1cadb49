//! Branch state registry.
//!
//! In-memory record of every observed branch and the kill statistics. Branch
//! states and statistics share one lock so a transition and its counter
//! update are a single step.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::types::{BranchError, BranchId, BranchState, KillStats, KillTransition};

#[derive(Debug, Default)]
struct RegistryInner {
    branches: HashMap<BranchId, BranchState>,
    stats: KillStats,
}

/// Authoritative record of branch states.
#[derive(Debug, Default)]
pub struct BranchRegistry {
    inner: RwLock<RegistryInner>,
}

impl BranchRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a branch on first observation.
    ///
    /// Returns the existing state unchanged if the branch is already known.
    pub fn register(&self, id: BranchId, workflow_id: Option<String>) -> BranchState {
        let mut inner = self.inner.write();
        inner
            .branches
            .entry(id)
            .or_insert_with_key(|id| {
                debug!(branch_id = %id, "Registering branch");
                BranchState::new(id.clone(), workflow_id)
            })
            .clone()
    }

    /// Records `child` as a dependent of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if either branch is unknown or if `parent == child`.
    pub fn add_dependent(&self, parent: &BranchId, child: &BranchId) -> Result<(), BranchError> {
        if parent == child {
            return Err(BranchError::SelfDependency(parent.clone()));
        }
        let mut inner = self.inner.write();
        if !inner.branches.contains_key(child) {
            return Err(BranchError::BranchNotFound(child.clone()));
        }
        let state = inner
            .branches
            .get_mut(parent)
            .ok_or_else(|| BranchError::BranchNotFound(parent.clone()))?;
        if state.add_child(child.clone()) {
            debug!(parent = %parent, child = %child, "Recorded dependent branch");
        }
        Ok(())
    }

    /// Get a branch by ID.
    pub fn get(&self, id: &BranchId) -> Option<BranchState> {
        self.inner.read().branches.get(id).cloned()
    }

    /// Check if a branch exists.
    pub fn contains(&self, id: &BranchId) -> bool {
        self.inner.read().branches.contains_key(id)
    }

    /// Dependent branches of `id`, in registration order.
    pub fn children(&self, id: &BranchId) -> Vec<BranchId> {
        self.inner
            .read()
            .branches
            .get(id)
            .map(|state| state.children().to_vec())
            .unwrap_or_default()
    }

    /// Get all branches, ordered by ID.
    pub fn all(&self) -> Vec<BranchState> {
        let mut branches: Vec<BranchState> =
            self.inner.read().branches.values().cloned().collect();
        branches.sort_by(|a, b| a.id().cmp(b.id()));
        branches
    }

    /// Moves a branch to Killed and counts the transition.
    ///
    /// An already-killed branch is returned unchanged and not counted again.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch is unknown.
    pub fn mark_killed(
        &self,
        id: &BranchId,
        reason: impl Into<String>,
        degraded: bool,
    ) -> Result<KillTransition, BranchError> {
        let mut inner = self.inner.write();
        let state = inner
            .branches
            .get_mut(id)
            .ok_or_else(|| BranchError::BranchNotFound(id.clone()))?;

        if !state.kill(reason.into(), Utc::now()) {
            return Ok(KillTransition::AlreadyKilled(state.clone()));
        }
        let state = state.clone();

        inner.stats.total_kills += 1;
        if degraded {
            inner.stats.degraded_kills += 1;
        }
        Ok(KillTransition::Killed(state))
    }

    /// Snapshot of the kill statistics.
    pub fn stats(&self) -> KillStats {
        self.inner.read().stats
    }

    /// Number of registered branches.
    pub fn len(&self) -> usize {
        self.inner.read().branches.len()
    }

    /// Returns true if no branch is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every branch and resets the statistics.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        debug!(branches = inner.branches.len(), "Clearing branch registry");
        *inner = RegistryInner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_manager::types::BranchStatus;

    fn id(raw: &str) -> BranchId {
        BranchId::new(raw).unwrap()
    }

    #[test]
    fn register_should_be_idempotent() {
        let registry = BranchRegistry::new();
        let first = registry.register(id("b1"), Some("wf-1".to_string()));
        let second = registry.register(id("b1"), Some("wf-other".to_string()));

        assert_eq!(first, second);
        assert_eq!(second.workflow_id(), Some("wf-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_dependent_should_validate_both_ends() {
        let registry = BranchRegistry::new();
        registry.register(id("root"), None);

        assert_eq!(
            registry.add_dependent(&id("root"), &id("missing")),
            Err(BranchError::BranchNotFound(id("missing")))
        );
        assert_eq!(
            registry.add_dependent(&id("root"), &id("root")),
            Err(BranchError::SelfDependency(id("root")))
        );

        registry.register(id("child"), None);
        registry.add_dependent(&id("root"), &id("child")).unwrap();
        registry.add_dependent(&id("root"), &id("child")).unwrap();
        assert_eq!(registry.children(&id("root")), vec![id("child")]);
    }

    #[test]
    fn mark_killed_should_count_once() {
        let registry = BranchRegistry::new();
        registry.register(id("b1"), None);

        let first = registry.mark_killed(&id("b1"), "failed", false).unwrap();
        let second = registry.mark_killed(&id("b1"), "again", true).unwrap();

        assert!(matches!(first, KillTransition::Killed(_)));
        assert!(matches!(second, KillTransition::AlreadyKilled(_)));
        assert_eq!(second.state().kill_reason(), Some("failed"));
        assert_eq!(second.state().killed_at(), first.state().killed_at());
        assert_eq!(
            registry.stats(),
            KillStats {
                total_kills: 1,
                degraded_kills: 0
            }
        );
    }

    #[test]
    fn mark_killed_should_fail_for_unknown_branch() {
        let registry = BranchRegistry::new();
        assert!(registry.mark_killed(&id("ghost"), "x", false).is_err());
        assert_eq!(registry.stats().total_kills, 0);
    }

    #[test]
    fn clear_should_reset_everything() {
        let registry = BranchRegistry::new();
        registry.register(id("b1"), None);
        registry.mark_killed(&id("b1"), "done", true).unwrap();

        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.stats(), KillStats::default());
        assert!(registry.get(&id("b1")).is_none());
    }

    #[test]
    fn all_should_be_sorted_by_id() {
        let registry = BranchRegistry::new();
        for raw in ["c", "a", "b"] {
            registry.register(id(raw), None);
        }
        let ids: Vec<String> = registry
            .all()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(registry
            .all()
            .iter()
            .all(|s| s.status() == BranchStatus::Active));
    }
}
