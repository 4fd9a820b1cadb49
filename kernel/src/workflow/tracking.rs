//! Status cache and pending-cancellation tracker.
//!
//! Both structures are owned by a single canceller and guarded by their own
//! read/write lock. Writers never hold both locks except in
//! [`CancellationLedger::clear`], which always takes them in the same order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::types::CancellationStatus;

/// Last known cancellation status per workflow identifier.
#[derive(Debug, Default)]
pub struct StatusCache {
    statuses: RwLock<HashMap<String, CancellationStatus>>,
}

impl StatusCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a status, replacing any earlier one for the same workflow.
    pub fn record(&self, status: CancellationStatus) {
        self.statuses
            .write()
            .insert(status.workflow_id.clone(), status);
    }

    /// Get the status for a workflow.
    pub fn get(&self, workflow_id: &str) -> Option<CancellationStatus> {
        self.statuses.read().get(workflow_id).cloned()
    }

    /// Number of cached statuses.
    pub fn len(&self) -> usize {
        self.statuses.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Workflows with a cancellation attempt currently in flight.
///
/// Each attempt gets a unique number so that an attempt finishing after a
/// [`CancellationLedger::clear`] cannot remove the marker of a newer attempt.
#[derive(Debug, Default)]
pub struct PendingTracker {
    attempts: RwLock<HashMap<String, u64>>,
    next_attempt: AtomicU64,
}

impl PendingTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the workflow as pending.
    ///
    /// Returns `None` if another attempt for the same workflow is in flight.
    /// The marker is removed when the returned guard is dropped.
    pub fn begin(&self, workflow_id: &str) -> Option<PendingGuard<'_>> {
        let mut attempts = self.attempts.write();
        if attempts.contains_key(workflow_id) {
            return None;
        }
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        attempts.insert(workflow_id.to_string(), attempt);
        Some(PendingGuard {
            tracker: self,
            workflow_id: workflow_id.to_string(),
            attempt,
        })
    }

    /// Returns true if an attempt for the workflow is in flight.
    pub fn contains(&self, workflow_id: &str) -> bool {
        self.attempts.read().contains_key(workflow_id)
    }

    /// Number of attempts in flight.
    pub fn len(&self) -> usize {
        self.attempts.read().len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, workflow_id: &str, attempt: u64) {
        let mut attempts = self.attempts.write();
        if attempts.get(workflow_id) == Some(&attempt) {
            attempts.remove(workflow_id);
        }
    }
}

/// Pending marker for one attempt; removed on drop.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    tracker: &'a PendingTracker,
    workflow_id: String,
    attempt: u64,
}

impl PendingGuard<'_> {
    /// Workflow this attempt is cancelling.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish(&self.workflow_id, self.attempt);
    }
}

/// Status cache and pending tracker owned together by one canceller.
#[derive(Debug, Default)]
pub struct CancellationLedger {
    /// Last known outcome per workflow.
    pub statuses: StatusCache,
    /// Attempts currently in flight.
    pub pending: PendingTracker,
}

impl CancellationLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties both structures while holding both write locks.
    pub fn clear(&self) {
        let mut statuses = self.statuses.statuses.write();
        let mut attempts = self.pending.attempts.write();
        statuses.clear();
        attempts.clear();
    }

    /// Stores the status of `attempt` unless a newer attempt owns the workflow.
    ///
    /// Returns false if the status was discarded.
    pub fn record_attempt(&self, attempt: &PendingGuard<'_>, status: CancellationStatus) -> bool {
        let mut statuses = self.statuses.statuses.write();
        let attempts = self.pending.attempts.read();
        match attempts.get(&attempt.workflow_id) {
            Some(&owner) if owner != attempt.attempt => false,
            _ => {
                statuses.insert(attempt.workflow_id.clone(), status);
                true
            }
        }
    }
}
