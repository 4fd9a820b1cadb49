//! Coordinator facade.
//!
//! Wires a workflow canceller into the kill-switch and the branch registry,
//! and exposes both to outside callers. Having no canceller is a valid state:
//! cancellation calls then succeed with no status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::branch_manager::{BranchError, BranchId, BranchRegistry, BranchState, KillStats};
use crate::infrastructure::config::{
    CancellationSettings, CancellerBackend, KillSwitchSettings, Settings,
};
use crate::kill_switch::{KillError, KillSwitch, TeardownHook};
use crate::workflow::{
    CancelError, CancellationMode, CancellationStatus, EngineCanceller, NoopCanceller,
    WorkflowCanceller, WorkflowEngineClient,
};

/// Composition root for branch kills and workflow cancellation.
pub struct Coordinator {
    registry: Arc<BranchRegistry>,
    kill_switch: KillSwitch,
    workflow_client: RwLock<Option<Arc<dyn WorkflowEngineClient>>>,
    cancellation: CancellationSettings,
    kill_settings: KillSwitchSettings,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("kill_switch", &self.kill_switch)
            .field("has_workflow_client", &self.workflow_client.read().is_some())
            .field("kill_settings", &self.kill_settings)
            .finish_non_exhaustive()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(KillSwitchSettings::default())
    }
}

impl Coordinator {
    /// Creates a coordinator with no canceller configured.
    #[must_use]
    pub fn new(kill_settings: KillSwitchSettings) -> Self {
        Self::with_settings(kill_settings, CancellationSettings::default())
    }

    /// Creates a coordinator from the full configuration.
    ///
    /// With the `noop` backend a [`NoopCanceller`] is installed immediately;
    /// with `engine` cancellation stays disabled until
    /// [`Self::set_workflow_client`] is called.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let coordinator =
            Self::with_settings(settings.kill_switch.clone(), settings.cancellation.clone());
        if settings.cancellation.backend == CancellerBackend::Noop {
            info!("Using no-op workflow canceller");
            coordinator.set_canceller(Arc::new(NoopCanceller::new()));
        }
        coordinator
    }

    fn with_settings(kill_settings: KillSwitchSettings, cancellation: CancellationSettings) -> Self {
        let registry = Arc::new(BranchRegistry::new());
        let kill_switch = KillSwitch::from_settings(registry.clone(), &kill_settings);
        Self {
            registry,
            kill_switch,
            workflow_client: RwLock::new(None),
            cancellation,
            kill_settings,
        }
    }

    /// Installs the workflow-engine client.
    ///
    /// If no canceller is configured yet, an [`EngineCanceller`] is built
    /// from the client with the given timeouts. Safe to call repeatedly.
    pub fn set_workflow_client(
        &self,
        client: Arc<dyn WorkflowEngineClient>,
        graceful_timeout: Duration,
        force_timeout: Duration,
    ) {
        *self.workflow_client.write() = Some(client.clone());
        let batch_concurrency = self.cancellation.batch_concurrency;
        let installed = self.kill_switch.set_canceller_if_absent(|| -> Arc<dyn WorkflowCanceller> {
            Arc::new(
                EngineCanceller::new(client, graceful_timeout, force_timeout)
                    .with_batch_concurrency(batch_concurrency),
            )
        });
        if installed {
            info!(
                graceful_timeout_ms = graceful_timeout.as_millis(),
                force_timeout_ms = force_timeout.as_millis(),
                "Installed engine-backed workflow canceller"
            );
        } else {
            debug!("Workflow client updated, keeping existing canceller");
        }
    }

    /// Installs the workflow-engine client with the configured timeouts.
    pub fn set_workflow_client_from_settings(&self, client: Arc<dyn WorkflowEngineClient>) {
        self.set_workflow_client(
            client,
            self.cancellation.graceful_timeout(),
            self.cancellation.force_timeout(),
        );
    }

    /// Installs a canceller, replacing any previous one.
    pub fn set_canceller(&self, canceller: Arc<dyn WorkflowCanceller>) {
        self.kill_switch.set_canceller(canceller);
    }

    /// Currently installed workflow-engine client.
    #[must_use]
    pub fn workflow_client(&self) -> Option<Arc<dyn WorkflowEngineClient>> {
        self.workflow_client.read().clone()
    }

    /// Currently installed canceller.
    #[must_use]
    pub fn canceller(&self) -> Option<Arc<dyn WorkflowCanceller>> {
        self.kill_switch.canceller()
    }

    /// The kill-switch engine.
    #[must_use]
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    /// Per-branch kill timeout from configuration.
    #[must_use]
    pub fn branch_kill_timeout(&self) -> Duration {
        self.kill_settings.branch_kill_timeout()
    }

    // Workflow cancellation

    /// Cancels one workflow. Returns `Ok(None)` if no canceller is configured.
    ///
    /// # Errors
    ///
    /// Returns `CancelError` if the request fails validation.
    pub async fn cancel_workflow(
        &self,
        workflow_id: &str,
        mode: CancellationMode,
    ) -> Result<Option<CancellationStatus>, CancelError> {
        let Some(canceller) = self.canceller() else {
            debug!(workflow_id = %workflow_id, "No canceller configured, skipping cancellation");
            return Ok(None);
        };
        canceller.cancel_workflow(workflow_id, mode).await.map(Some)
    }

    /// Cancels one workflow cooperatively.
    ///
    /// # Errors
    ///
    /// Returns `CancelError` if the request fails validation.
    pub async fn cancel_workflow_graceful(
        &self,
        workflow_id: &str,
    ) -> Result<Option<CancellationStatus>, CancelError> {
        self.cancel_workflow(workflow_id, CancellationMode::Graceful)
            .await
    }

    /// Terminates one workflow immediately.
    ///
    /// # Errors
    ///
    /// Returns `CancelError` if the request fails validation.
    pub async fn cancel_workflow_force(
        &self,
        workflow_id: &str,
    ) -> Result<Option<CancellationStatus>, CancelError> {
        self.cancel_workflow(workflow_id, CancellationMode::Force)
            .await
    }

    /// Cancels many workflows. Returns `None` if no canceller is configured.
    pub async fn cancel_workflows(
        &self,
        workflow_ids: &[String],
        mode: CancellationMode,
    ) -> Option<HashMap<String, CancellationStatus>> {
        let canceller = self.canceller()?;
        Some(canceller.cancel_workflows(workflow_ids, mode).await)
    }

    /// Last known cancellation status for a workflow.
    #[must_use]
    pub fn cancellation_status(&self, workflow_id: &str) -> Option<CancellationStatus> {
        self.canceller()
            .and_then(|canceller| canceller.cancellation_status(workflow_id))
    }

    /// Returns true while a cancellation for the workflow is in flight.
    #[must_use]
    pub fn has_pending_cancellation(&self, workflow_id: &str) -> bool {
        self.canceller()
            .is_some_and(|canceller| canceller.has_pending_cancellation(workflow_id))
    }

    /// Forgets every cached cancellation status and pending marker.
    pub fn clear_cancellations(&self) {
        if let Some(canceller) = self.canceller() {
            canceller.clear();
        }
    }

    // Branches

    /// Registers a branch, optionally bound to a workflow execution.
    pub fn register_branch(&self, id: BranchId, workflow_id: Option<String>) -> BranchState {
        self.registry.register(id, workflow_id)
    }

    /// Records `child` as a dependent of `parent`.
    ///
    /// # Errors
    ///
    /// Returns `BranchError` if either branch is unknown or they are the same.
    pub fn add_dependent(&self, parent: &BranchId, child: &BranchId) -> Result<(), BranchError> {
        self.registry.add_dependent(parent, child)
    }

    /// Get a branch by ID.
    #[must_use]
    pub fn branch(&self, id: &BranchId) -> Option<BranchState> {
        self.registry.get(id)
    }

    /// Get all branches, ordered by ID.
    #[must_use]
    pub fn branches(&self) -> Vec<BranchState> {
        self.registry.all()
    }

    /// Kill statistics.
    #[must_use]
    pub fn stats(&self) -> KillStats {
        self.registry.stats()
    }

    /// Removes every branch and resets the statistics.
    pub fn clear_branches(&self) {
        self.registry.clear();
    }

    /// Adds a teardown hook run for every subsequent kill.
    pub fn add_teardown_hook(&self, hook: Arc<dyn TeardownHook>) {
        self.kill_switch.add_teardown_hook(hook);
    }

    /// Kills one branch.
    ///
    /// # Errors
    ///
    /// Returns `KillError` if the branch is unknown or its teardown timed
    /// out. After a timeout the branch is still Killed.
    pub async fn kill_branch(
        &self,
        branch_id: &BranchId,
        reason: &str,
        timeout: Duration,
    ) -> Result<(), KillError> {
        self.kill_switch.kill_branch(branch_id, reason, timeout).await
    }

    /// Kills one branch, cancelling its workflow in the given mode.
    ///
    /// # Errors
    ///
    /// Returns `KillError` if the branch is unknown or its teardown timed
    /// out. After a timeout the branch is still Killed.
    pub async fn kill_branch_with_mode(
        &self,
        branch_id: &BranchId,
        reason: &str,
        timeout: Duration,
        mode: CancellationMode,
    ) -> Result<(), KillError> {
        self.kill_switch
            .kill_branch_with_mode(branch_id, reason, timeout, mode)
            .await
    }

    /// Kills a branch and all of its transitive dependents.
    ///
    /// # Errors
    ///
    /// Returns the first `KillError` encountered during the cascade.
    pub async fn kill_dependent_branches(
        &self,
        root: &BranchId,
        timeout: Duration,
    ) -> Result<(), KillError> {
        self.kill_switch.kill_dependent_branches(root, timeout).await
    }
}
