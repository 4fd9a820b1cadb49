//! Workflow cancellation subsystem.
//!
//! Mode-aware single and batch cancellation of remote workflow executions,
//! with a status cache and pending-attempt tracking owned by each canceller.

pub mod canceller;
pub mod client;
pub mod noop;
pub mod tracking;
pub mod types;

pub use canceller::{cancel_all, EngineCanceller, WorkflowCanceller, DEFAULT_BATCH_CONCURRENCY};
pub use client::{EngineAck, EngineError, WorkflowEngineClient};
pub use noop::NoopCanceller;
pub use tracking::{CancellationLedger, PendingGuard, PendingTracker, StatusCache};
pub use types::{validate_workflow_id, CancelError, CancellationMode, CancellationStatus};
