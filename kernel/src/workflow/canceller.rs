//! Workflow canceller contract and the engine-backed implementation.
//!
//! Every canceller exposes the same capability set through the
//! [`WorkflowCanceller`] trait. [`EngineCanceller`] talks to a live
//! workflow engine; the no-op variant lives in [`super::noop`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::{EngineAck, EngineError, WorkflowEngineClient};
use super::tracking::{CancellationLedger, PendingGuard};
use super::types::{validate_workflow_id, CancelError, CancellationMode, CancellationStatus};
use crate::infrastructure::config::CancellationSettings;

/// Maximum number of cancellations one batch call keeps in flight.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// Reason attached to hard-terminate requests.
const FORCE_TERMINATE_REASON: &str = "force cancellation requested";

/// Error recorded when the caller stops waiting before the attempt concludes.
const ABANDONED_ERROR: &str = "cancellation abandoned before the engine responded";

/// Contract for cancelling remote workflow executions.
#[async_trait]
pub trait WorkflowCanceller: Send + Sync {
    /// Cancels one workflow in the given mode.
    ///
    /// Engine failures and timeouts are reported inside the returned status
    /// with `success == false`.
    ///
    /// # Errors
    ///
    /// Returns `CancelError` only when the request fails validation.
    async fn cancel_workflow(
        &self,
        workflow_id: &str,
        mode: CancellationMode,
    ) -> Result<CancellationStatus, CancelError>;

    /// Cancels one workflow cooperatively.
    ///
    /// # Errors
    ///
    /// Returns `CancelError` only when the request fails validation.
    async fn cancel_workflow_graceful(
        &self,
        workflow_id: &str,
    ) -> Result<CancellationStatus, CancelError> {
        self.cancel_workflow(workflow_id, CancellationMode::Graceful)
            .await
    }

    /// Terminates one workflow immediately.
    ///
    /// # Errors
    ///
    /// Returns `CancelError` only when the request fails validation.
    async fn cancel_workflow_force(
        &self,
        workflow_id: &str,
    ) -> Result<CancellationStatus, CancelError> {
        self.cancel_workflow(workflow_id, CancellationMode::Force)
            .await
    }

    /// Cancels many workflows, keeping at most [`Self::batch_concurrency`]
    /// in flight. Returns one status per distinct identifier.
    async fn cancel_workflows(
        &self,
        workflow_ids: &[String],
        mode: CancellationMode,
    ) -> HashMap<String, CancellationStatus> {
        cancel_all(self, workflow_ids, mode).await
    }

    /// Concurrency limit used by [`Self::cancel_workflows`].
    fn batch_concurrency(&self) -> usize {
        DEFAULT_BATCH_CONCURRENCY
    }

    /// Last known status for a workflow.
    fn cancellation_status(&self, workflow_id: &str) -> Option<CancellationStatus>;

    /// Returns true while a cancellation for the workflow is in flight.
    fn has_pending_cancellation(&self, workflow_id: &str) -> bool;

    /// Forgets every cached status and pending marker.
    fn clear(&self);
}

/// Fans out single cancellations behind a per-call semaphore.
///
/// Duplicate identifiers are cancelled once. Validation failures become
/// unsuccessful statuses so the result always has an entry per identifier.
pub async fn cancel_all<C>(
    canceller: &C,
    workflow_ids: &[String],
    mode: CancellationMode,
) -> HashMap<String, CancellationStatus>
where
    C: WorkflowCanceller + ?Sized,
{
    let semaphore = Semaphore::new(canceller.batch_concurrency().max(1));
    let mut seen = HashSet::with_capacity(workflow_ids.len());
    let unique: Vec<&String> = workflow_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .collect();

    debug!(
        requested = workflow_ids.len(),
        unique = unique.len(),
        mode = %mode,
        "Starting batch cancellation"
    );

    let attempts = unique.into_iter().map(|workflow_id| {
        let semaphore = &semaphore;
        async move {
            let status = match semaphore.acquire().await {
                Ok(_permit) => match canceller.cancel_workflow(workflow_id, mode).await {
                    Ok(status) => status,
                    Err(e) => CancellationStatus::rejected(workflow_id.as_str(), mode, e),
                },
                Err(e) => CancellationStatus::rejected(
                    workflow_id.as_str(),
                    mode,
                    format!("concurrency limiter closed: {e}"),
                ),
            };
            (workflow_id.clone(), status)
        }
    });

    join_all(attempts).await.into_iter().collect()
}

/// Canceller backed by a live workflow engine.
pub struct EngineCanceller {
    client: Arc<dyn WorkflowEngineClient>,
    graceful_timeout: Duration,
    force_timeout: Duration,
    batch_concurrency: usize,
    ledger: CancellationLedger,
}

impl std::fmt::Debug for EngineCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCanceller")
            .field("graceful_timeout", &self.graceful_timeout)
            .field("force_timeout", &self.force_timeout)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl EngineCanceller {
    /// Creates a canceller with the given per-mode timeouts.
    #[must_use]
    pub fn new(
        client: Arc<dyn WorkflowEngineClient>,
        graceful_timeout: Duration,
        force_timeout: Duration,
    ) -> Self {
        Self {
            client,
            graceful_timeout,
            force_timeout,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            ledger: CancellationLedger::new(),
        }
    }

    /// Creates a canceller from configuration.
    #[must_use]
    pub fn from_settings(
        client: Arc<dyn WorkflowEngineClient>,
        settings: &CancellationSettings,
    ) -> Self {
        Self::new(
            client,
            settings.graceful_timeout(),
            settings.force_timeout(),
        )
        .with_batch_concurrency(settings.batch_concurrency)
    }

    /// Overrides the batch concurrency limit (minimum 1).
    #[must_use]
    pub fn with_batch_concurrency(mut self, limit: usize) -> Self {
        self.batch_concurrency = limit.max(1);
        self
    }

    /// Timeout applied to a cancellation in the given mode.
    #[must_use]
    pub fn timeout_for(&self, mode: CancellationMode) -> Duration {
        match mode {
            CancellationMode::Graceful => self.graceful_timeout,
            CancellationMode::Force => self.force_timeout,
        }
    }

    async fn dispatch(
        &self,
        workflow_id: &str,
        mode: CancellationMode,
    ) -> Result<EngineAck, EngineError> {
        match mode {
            CancellationMode::Graceful => self.client.request_cancel(workflow_id).await,
            CancellationMode::Force => {
                self.client
                    .terminate(workflow_id, FORCE_TERMINATE_REASON)
                    .await
            }
        }
    }
}

/// Concludes the cached status if the attempt is dropped mid-flight.
///
/// Owns the pending marker, which is released after the status is written.
struct InFlightAttempt<'a> {
    ledger: &'a CancellationLedger,
    pending: PendingGuard<'a>,
    requested: Option<CancellationStatus>,
    started: Instant,
}

impl InFlightAttempt<'_> {
    fn record(&self, status: CancellationStatus) {
        if !self.ledger.record_attempt(&self.pending, status) {
            debug!(
                workflow_id = %self.pending.workflow_id(),
                "Newer cancellation attempt owns the status, discarding result"
            );
        }
    }
}

impl Drop for InFlightAttempt<'_> {
    fn drop(&mut self) {
        if let Some(requested) = self.requested.take() {
            warn!(workflow_id = %requested.workflow_id, "Cancellation attempt abandoned");
            self.record(requested.failed(self.started.elapsed(), ABANDONED_ERROR));
        }
    }
}

#[async_trait]
impl WorkflowCanceller for EngineCanceller {
    async fn cancel_workflow(
        &self,
        workflow_id: &str,
        mode: CancellationMode,
    ) -> Result<CancellationStatus, CancelError> {
        validate_workflow_id(workflow_id)?;

        let Some(pending) = self.ledger.pending.begin(workflow_id) else {
            debug!(
                workflow_id = %workflow_id,
                mode = %mode,
                "Cancellation already in progress, not dispatching again"
            );
            return Ok(CancellationStatus::rejected(
                workflow_id,
                mode,
                "cancellation already in progress",
            ));
        };

        let requested = CancellationStatus::pending(workflow_id, mode);
        let limit = self.timeout_for(mode);
        let started = Instant::now();
        let mut in_flight = InFlightAttempt {
            ledger: &self.ledger,
            pending,
            requested: Some(requested.clone()),
            started,
        };
        in_flight.record(requested.clone());

        let outcome = tokio::time::timeout(limit, self.dispatch(workflow_id, mode)).await;
        let elapsed = started.elapsed();
        in_flight.requested = None;

        let (status, outcome_label) = match outcome {
            Ok(Ok(ack)) => {
                info!(
                    workflow_id = %workflow_id,
                    mode = %mode,
                    duration_ms = elapsed.as_millis(),
                    resources_freed = ack.resources_freed.len(),
                    "Workflow cancelled"
                );
                (requested.succeeded(elapsed, ack.resources_freed), "succeeded")
            }
            Ok(Err(e)) => {
                warn!(
                    workflow_id = %workflow_id,
                    mode = %mode,
                    error = %e,
                    "Workflow engine failed to cancel workflow"
                );
                (requested.failed(elapsed, e.to_string()), "failed")
            }
            Err(_) => {
                warn!(
                    workflow_id = %workflow_id,
                    mode = %mode,
                    timeout_ms = limit.as_millis(),
                    "Workflow cancellation timed out"
                );
                (requested.timed_out(elapsed, limit), "timed_out")
            }
        };

        metrics::counter!(
            "killswitch_workflow_cancellations_total",
            "mode" => mode.as_str(),
            "outcome" => outcome_label
        )
        .increment(1);

        in_flight.record(status.clone());
        Ok(status)
    }

    fn batch_concurrency(&self) -> usize {
        self.batch_concurrency
    }

    fn cancellation_status(&self, workflow_id: &str) -> Option<CancellationStatus> {
        self.ledger.statuses.get(workflow_id)
    }

    fn has_pending_cancellation(&self, workflow_id: &str) -> bool {
        self.ledger.pending.contains(workflow_id)
    }

    fn clear(&self) {
        debug!("Clearing cancellation cache and pending tracker");
        self.ledger.clear();
    }
}
