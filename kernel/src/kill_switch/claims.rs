//! In-flight kill claims.
//!
//! At most one kill per branch runs its teardown at a time. Later callers get
//! a waiter that resolves once the claim holder finishes or is dropped.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::branch_manager::BranchId;

/// Set of branches whose teardown is currently running.
#[derive(Debug, Default)]
pub(crate) struct KillClaims {
    inner: Mutex<HashMap<BranchId, watch::Sender<()>>>,
}

/// Result of trying to claim a branch.
pub(crate) enum Claim<'a> {
    /// The caller owns the kill until the guard is dropped.
    Acquired(ClaimGuard<'a>),
    /// Another caller owns the kill.
    InFlight(ClaimWaiter),
}

impl KillClaims {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn claim(&self, id: &BranchId) -> Claim<'_> {
        let mut inner = self.inner.lock();
        if let Some(sender) = inner.get(id) {
            return Claim::InFlight(ClaimWaiter {
                receiver: sender.subscribe(),
            });
        }
        let (sender, _) = watch::channel(());
        inner.insert(id.clone(), sender);
        Claim::Acquired(ClaimGuard {
            claims: self,
            id: id.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_claimed(&self, id: &BranchId) -> bool {
        self.inner.lock().contains_key(id)
    }
}

/// Releases the claim on drop, waking every waiter.
pub(crate) struct ClaimGuard<'a> {
    claims: &'a KillClaims,
    id: BranchId,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        // Dropping the sender closes the channel.
        self.claims.inner.lock().remove(&self.id);
    }
}

/// Handle for waiting on somebody else's claim.
pub(crate) struct ClaimWaiter {
    receiver: watch::Receiver<()>,
}

impl ClaimWaiter {
    /// Resolves once the claim is released.
    pub(crate) async fn released(mut self) {
        // Nothing is ever sent, so this only returns when the sender is gone.
        while self.receiver.changed().await.is_ok() {}
    }
}
