//! Core kill-switch engine.
//!
//! Provides the `KillSwitch` that terminates single branches and cascades
//! through their dependents, enforcing per-branch and cascade timeouts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::branch_manager::{BranchId, BranchRegistry, BranchState, KillTransition};
use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::infrastructure::config::KillSwitchSettings;
use crate::workflow::{CancellationMode, WorkflowCanceller};

use super::claims::{Claim, KillClaims};
use super::teardown::{run_hooks, TeardownHook};
use super::tracking::{KillError, TeardownReport};
use super::DEFAULT_CASCADE_MULTIPLIER;

/// Reason recorded on the root of a cascade.
const CASCADE_ROOT_REASON: &str = "cascade kill";

/// Engine that kills branches and their dependents.
pub struct KillSwitch {
    /// Authoritative branch state.
    registry: Arc<BranchRegistry>,
    /// Canceller for the workflows backing branches, if one is configured.
    canceller: RwLock<Option<Arc<dyn WorkflowCanceller>>>,
    /// External cleanup run for every killed branch.
    hooks: RwLock<Vec<Arc<dyn TeardownHook>>>,
    /// Branches whose teardown is running.
    claims: KillClaims,
    /// Mode used by [`KillSwitch::kill_branch`].
    default_mode: CancellationMode,
    /// Cascade bound as a multiple of the per-branch timeout.
    cascade_multiplier: u32,
}

impl std::fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillSwitch")
            .field("registry", &self.registry)
            .field("has_canceller", &self.canceller.read().is_some())
            .field("hooks", &self.hooks.read().len())
            .field("default_mode", &self.default_mode)
            .field("cascade_multiplier", &self.cascade_multiplier)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct CascadeProgress {
    visited: usize,
    first_error: Option<KillError>,
    /// The cascade deadline passed before every branch was visited.
    exhausted: bool,
}

/// Instant `timeout` from now, saturating far in the future.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

fn timed_out_reason(reason: &str, timeout: Duration) -> String {
    format!("{reason} (teardown timed out after {timeout:?})")
}

impl KillSwitch {
    /// Creates a kill-switch over the given registry with no canceller.
    #[must_use]
    pub fn new(registry: Arc<BranchRegistry>) -> Self {
        Self {
            registry,
            canceller: RwLock::new(None),
            hooks: RwLock::new(Vec::new()),
            claims: KillClaims::new(),
            default_mode: CancellationMode::Graceful,
            cascade_multiplier: DEFAULT_CASCADE_MULTIPLIER,
        }
    }

    /// Creates a kill-switch configured from settings.
    #[must_use]
    pub fn from_settings(registry: Arc<BranchRegistry>, settings: &KillSwitchSettings) -> Self {
        Self::new(registry)
            .with_default_mode(settings.default_mode)
            .with_cascade_multiplier(settings.cascade_timeout_multiplier)
    }

    /// Sets the cancellation mode used by [`Self::kill_branch`].
    #[must_use]
    pub fn with_default_mode(mut self, mode: CancellationMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Overrides the cascade timeout multiplier (minimum 1).
    #[must_use]
    pub fn with_cascade_multiplier(mut self, multiplier: u32) -> Self {
        self.cascade_multiplier = multiplier.max(1);
        self
    }

    /// The registry this kill-switch drives.
    #[must_use]
    pub fn registry(&self) -> &Arc<BranchRegistry> {
        &self.registry
    }

    /// Mode used by [`Self::kill_branch`].
    #[must_use]
    pub fn default_mode(&self) -> CancellationMode {
        self.default_mode
    }

    /// Installs a canceller, replacing any previous one.
    pub fn set_canceller(&self, canceller: Arc<dyn WorkflowCanceller>) {
        *self.canceller.write() = Some(canceller);
    }

    /// Installs the canceller built by `build` unless one is already set.
    ///
    /// Returns true if a canceller was installed.
    pub fn set_canceller_if_absent(&self, build: impl FnOnce() -> Arc<dyn WorkflowCanceller>) -> bool {
        let mut canceller = self.canceller.write();
        if canceller.is_some() {
            return false;
        }
        *canceller = Some(build());
        true
    }

    /// Currently configured canceller.
    #[must_use]
    pub fn canceller(&self) -> Option<Arc<dyn WorkflowCanceller>> {
        self.canceller.read().clone()
    }

    /// Adds a teardown hook run for every subsequent kill.
    pub fn add_teardown_hook(&self, hook: Arc<dyn TeardownHook>) {
        debug!(hook = %hook.name(), "Registering teardown hook");
        self.hooks.write().push(hook);
    }

    /// Number of registered teardown hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.read().len()
    }

    /// Overall bound for a cascade given the per-branch timeout.
    #[must_use]
    pub fn cascade_timeout(&self, per_branch: Duration) -> Duration {
        per_branch.saturating_mul(self.cascade_multiplier)
    }

    /// Kills one branch using the default cancellation mode.
    ///
    /// # Errors
    ///
    /// Returns `KillError` if:
    /// - The branch is not registered
    /// - Teardown timed out (the branch is still marked Killed)
    pub async fn kill_branch(
        &self,
        branch_id: &BranchId,
        reason: &str,
        timeout: Duration,
    ) -> Result<(), KillError> {
        self.kill_branch_with_mode(branch_id, reason, timeout, self.default_mode)
            .await
    }

    /// Kills one branch, cancelling its workflow in the given mode.
    ///
    /// Already-killed branches are left untouched. A concurrent call for a
    /// branch being killed waits for that kill, bounded by its own `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `KillError` if:
    /// - The branch is not registered
    /// - Teardown timed out (the branch is still marked Killed)
    pub async fn kill_branch_with_mode(
        &self,
        branch_id: &BranchId,
        reason: &str,
        timeout: Duration,
        mode: CancellationMode,
    ) -> Result<(), KillError> {
        self.kill_until(branch_id, reason, deadline_after(timeout), timeout, mode)
            .await
    }

    /// Kills one branch, giving up at `deadline`; `timeout` is the budget
    /// reported on expiry.
    async fn kill_until(
        &self,
        branch_id: &BranchId,
        reason: &str,
        deadline: Instant,
        timeout: Duration,
        mode: CancellationMode,
    ) -> Result<(), KillError> {
        loop {
            let state = self
                .registry
                .get(branch_id)
                .ok_or_else(|| KillError::BranchNotFound(branch_id.clone()))?;
            if state.is_killed() {
                debug!(branch_id = %branch_id, "Branch already killed, nothing to do");
                return Ok(());
            }

            match self.claims.claim(branch_id) {
                Claim::Acquired(_guard) => {
                    // A previous holder may have finished between the read and the claim.
                    let state = self
                        .registry
                        .get(branch_id)
                        .ok_or_else(|| KillError::BranchNotFound(branch_id.clone()))?;
                    if state.is_killed() {
                        return Ok(());
                    }
                    return self
                        .kill_claimed(state, reason, deadline, timeout, mode)
                        .await;
                }
                Claim::InFlight(waiter) => {
                    debug!(branch_id = %branch_id, "Kill already in progress, waiting");
                    if tokio::time::timeout_at(deadline, waiter.released())
                        .await
                        .is_err()
                    {
                        warn!(
                            branch_id = %branch_id,
                            timeout_ms = timeout.as_millis(),
                            "Timed out waiting for in-flight kill, marking killed anyway"
                        );
                        self.record_kill(branch_id, timed_out_reason(reason, timeout), true)?;
                        return Err(KillError::Timeout {
                            branch_id: branch_id.clone(),
                            timeout,
                        });
                    }
                }
            }
        }
    }

    async fn kill_claimed(
        &self,
        state: BranchState,
        reason: &str,
        deadline: Instant,
        timeout: Duration,
        mode: CancellationMode,
    ) -> Result<(), KillError> {
        let branch_id = state.id().clone();
        info!(branch_id = %branch_id, reason = %reason, mode = %mode, "Killing branch");

        let started = Instant::now();
        match tokio::time::timeout_at(deadline, self.teardown(&state, mode)).await {
            Ok(report) => {
                if report.is_clean() {
                    debug!(
                        branch_id = %branch_id,
                        duration_ms = started.elapsed().as_millis(),
                        "Branch teardown finished"
                    );
                } else {
                    warn!(
                        branch_id = %branch_id,
                        cancellation = %report.cancellation_summary(),
                        failed_hooks = ?report.failed_hooks,
                        "Branch teardown finished with failures"
                    );
                }
                self.record_kill(&branch_id, reason.to_string(), false)?;
                Ok(())
            }
            Err(_) => {
                warn!(
                    branch_id = %branch_id,
                    timeout_ms = timeout.as_millis(),
                    "Branch teardown timed out, marking killed anyway"
                );
                self.record_kill(&branch_id, timed_out_reason(reason, timeout), true)?;
                Err(KillError::Timeout { branch_id, timeout })
            }
        }
    }

    /// Cancels the branch's workflow and runs the hooks concurrently.
    async fn teardown(&self, state: &BranchState, mode: CancellationMode) -> TeardownReport {
        let canceller = self.canceller();
        let hooks = self.hooks.read().clone();

        let cancellation = async {
            match (canceller, state.workflow_id()) {
                (Some(canceller), Some(workflow_id)) => {
                    Some(canceller.cancel_workflow(workflow_id, mode).await)
                }
                _ => None,
            }
        };

        let (cancellation, failed_hooks) = tokio::join!(cancellation, run_hooks(&hooks, state));
        TeardownReport {
            cancellation,
            failed_hooks,
        }
    }

    fn record_kill(
        &self,
        branch_id: &BranchId,
        reason: String,
        degraded: bool,
    ) -> Result<(), KillError> {
        match self.registry.mark_killed(branch_id, reason, degraded)? {
            KillTransition::Killed(state) => {
                let outcome = if degraded { "degraded" } else { "clean" };
                metrics::counter!("killswitch_branch_kills_total", "outcome" => outcome)
                    .increment(1);
                log_audit(&AuditEvent::BranchKilled {
                    branch_id: branch_id.to_string(),
                    reason: state.kill_reason().unwrap_or_default().to_string(),
                    degraded,
                });
            }
            KillTransition::AlreadyKilled(_) => {
                debug!(branch_id = %branch_id, "Branch was killed concurrently");
            }
        }
        Ok(())
    }

    /// Kills `root` and every transitive dependent in pre-order.
    ///
    /// Each branch gets `timeout`, shortened to whatever is left of
    /// [`Self::cascade_timeout`]. Traversal continues past per-branch errors
    /// and stops once the cascade deadline has passed. A branch whose kill is
    /// cut short by the deadline is still marked Killed (degraded); branches
    /// not reached by then stay Active.
    ///
    /// # Errors
    ///
    /// Returns the first `KillError` encountered, or
    /// [`KillError::CascadeTimeout`] if the cascade ran out of time without
    /// any earlier error.
    pub async fn kill_dependent_branches(
        &self,
        root: &BranchId,
        timeout: Duration,
    ) -> Result<(), KillError> {
        if !self.registry.contains(root) {
            return Err(KillError::BranchNotFound(root.clone()));
        }

        let cascade_timeout = self.cascade_timeout(timeout);
        info!(
            root = %root,
            timeout_ms = timeout.as_millis(),
            cascade_timeout_ms = cascade_timeout.as_millis(),
            "Starting cascade kill"
        );

        let mut progress = CascadeProgress::default();
        self.walk(root, timeout, deadline_after(cascade_timeout), &mut progress)
            .await;

        let result = match (progress.first_error, progress.exhausted) {
            (Some(e), _) => Err(e),
            (None, false) => Ok(()),
            (None, true) => Err(KillError::CascadeTimeout {
                root: root.clone(),
                timeout: cascade_timeout,
            }),
        };

        match &result {
            Ok(()) => info!(root = %root, visited = progress.visited, "Cascade kill finished"),
            Err(e) => warn!(
                root = %root,
                visited = progress.visited,
                error = %e,
                "Cascade kill finished with errors"
            ),
        }
        metrics::counter!("killswitch_cascades_total").increment(1);
        log_audit(&AuditEvent::CascadeFinished {
            root: root.to_string(),
            visited: progress.visited,
            error: result.as_ref().err().map(ToString::to_string),
        });

        result
    }

    async fn walk(
        &self,
        root: &BranchId,
        timeout: Duration,
        deadline: Instant,
        progress: &mut CascadeProgress,
    ) {
        let mut stack = vec![root.clone()];
        let mut visited = HashSet::new();
        let descendant_reason = format!("cascade from {root}");

        while let Some(branch_id) = stack.pop() {
            if visited.contains(&branch_id) {
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                progress.exhausted = true;
                break;
            }
            visited.insert(branch_id.clone());
            progress.visited += 1;

            let reason = if &branch_id == root {
                CASCADE_ROOT_REASON
            } else {
                descendant_reason.as_str()
            };
            let budget = timeout.min(remaining);
            let step = self
                .kill_until(
                    &branch_id,
                    reason,
                    Instant::now() + budget,
                    budget,
                    self.default_mode,
                )
                .await;
            match step {
                Ok(()) => {}
                Err(KillError::Timeout { .. }) if budget < timeout => {
                    warn!(root = %root, branch_id = %branch_id, "Cascade deadline reached");
                    progress.exhausted = true;
                    break;
                }
                Err(e) => {
                    warn!(root = %root, branch_id = %branch_id, error = %e, "Cascade step failed");
                    if progress.first_error.is_none() {
                        progress.first_error = Some(e);
                    }
                }
            }

            // Reversed so the first child is killed first.
            stack.extend(self.registry.children(&branch_id).into_iter().rev());
        }
    }
}
