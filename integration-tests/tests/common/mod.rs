//! Shared test utilities for integration tests.
//!
//! Provides a scripted workflow engine, a recording teardown hook, and helpers
//! for building branch trees on a coordinator.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use branch_killswitch::branch_manager::{BranchId, BranchState};
use branch_killswitch::infrastructure::config::KillSwitchSettings;
use branch_killswitch::kill_switch::{TeardownError, TeardownHook};
use branch_killswitch::workflow::{EngineAck, EngineError, WorkflowEngineClient};
use branch_killswitch::Coordinator;
use parking_lot::Mutex;

/// Graceful timeout used by the test coordinators.
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_millis(500);
/// Force timeout used by the test coordinators.
pub const FORCE_TIMEOUT: Duration = Duration::from_millis(250);

/// Which engine call a request used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// Cooperative cancellation.
    Cancel(String),
    /// Hard termination.
    Terminate(String),
}

/// Workflow engine whose latency and failures are scripted per workflow.
#[derive(Default)]
pub struct MockEngine {
    default_delay: Duration,
    delays: Mutex<HashMap<String, Duration>>,
    unknown: Mutex<Vec<String>>,
    calls: Mutex<Vec<EngineCall>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockEngine {
    /// Creates an engine that acknowledges every request after `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            default_delay: delay,
            ..Self::default()
        }
    }

    /// Overrides the acknowledgement delay for one workflow.
    pub fn delay(&self, workflow_id: &str, delay: Duration) {
        self.delays.lock().insert(workflow_id.to_string(), delay);
    }

    /// Makes the engine report the workflow as unknown.
    pub fn forget(&self, workflow_id: &str) {
        self.unknown.lock().push(workflow_id.to_string());
    }

    /// Every request received, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Highest number of requests in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn respond(&self, call: EngineCall, workflow_id: &str) -> Result<EngineAck, EngineError> {
        self.calls.lock().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .get(workflow_id)
            .copied()
            .unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unknown.lock().iter().any(|w| w == workflow_id) {
            return Err(EngineError::NotFound(workflow_id.to_string()));
        }
        Ok(EngineAck::with_resources([format!("{workflow_id}-cell")]))
    }
}

#[async_trait]
impl WorkflowEngineClient for MockEngine {
    async fn request_cancel(&self, workflow_id: &str) -> Result<EngineAck, EngineError> {
        self.respond(EngineCall::Cancel(workflow_id.to_string()), workflow_id)
            .await
    }

    async fn terminate(&self, workflow_id: &str, _reason: &str) -> Result<EngineAck, EngineError> {
        self.respond(EngineCall::Terminate(workflow_id.to_string()), workflow_id)
            .await
    }
}

/// Teardown hook that records which branches it tore down.
#[derive(Default)]
pub struct WorktreeHook {
    removed: Mutex<Vec<String>>,
}

impl WorktreeHook {
    /// Branches whose worktree was removed, in order.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl TeardownHook for WorktreeHook {
    fn name(&self) -> &str {
        "worktree"
    }

    async fn teardown(&self, branch: &BranchState) -> Result<(), TeardownError> {
        self.removed.lock().push(branch.id().to_string());
        Ok(())
    }
}

/// Coordinator wired to `engine` with the test timeouts.
pub fn coordinator(engine: &Arc<MockEngine>, settings: KillSwitchSettings) -> Coordinator {
    let coordinator = Coordinator::new(settings);
    coordinator.set_workflow_client(engine.clone(), GRACEFUL_TIMEOUT, FORCE_TIMEOUT);
    coordinator
}

/// Parses a branch identifier.
pub fn branch(raw: &str) -> BranchId {
    BranchId::new(raw).expect("valid branch id")
}

/// Registers every branch in `edges` bound to workflow `wf-<branch>` and
/// records the dependencies.
pub fn register_tree(coordinator: &Coordinator, edges: &[(&str, &str)]) {
    for (parent, child) in edges {
        for raw in [parent, child] {
            coordinator.register_branch(branch(raw), Some(format!("wf-{raw}")));
        }
        coordinator
            .add_dependent(&branch(parent), &branch(child))
            .expect("both branches registered");
    }
}
