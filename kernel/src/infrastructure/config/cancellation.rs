//! Workflow cancellation configuration.
//!
//! This module defines per-mode timeouts, batch limits and the canceller backend.

use std::time::Duration;

use serde::Deserialize;

/// Which canceller the coordinator installs at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CancellerBackend {
    /// Engine-backed canceller, built once a workflow client is installed.
    #[default]
    Engine,
    /// Canceller that reports success without contacting any engine.
    Noop,
}

/// Cancellation settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CancellationSettings {
    /// Timeout for cooperative cancellation in milliseconds (default: 30000)
    #[serde(default = "default_graceful_timeout_ms")]
    pub graceful_timeout_ms: u64,

    /// Timeout for forced termination in milliseconds (default: 5000)
    #[serde(default = "default_force_timeout_ms")]
    pub force_timeout_ms: u64,

    /// Maximum cancellations in flight per batch call (default: 10)
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Canceller backend (default: engine)
    #[serde(default)]
    pub backend: CancellerBackend,
}

impl CancellationSettings {
    /// Timeout for cooperative cancellation.
    #[must_use]
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    /// Timeout for forced termination.
    #[must_use]
    pub fn force_timeout(&self) -> Duration {
        Duration::from_millis(self.force_timeout_ms)
    }
}

impl Default for CancellationSettings {
    fn default() -> Self {
        Self {
            graceful_timeout_ms: default_graceful_timeout_ms(),
            force_timeout_ms: default_force_timeout_ms(),
            batch_concurrency: default_batch_concurrency(),
            backend: CancellerBackend::default(),
        }
    }
}

fn default_graceful_timeout_ms() -> u64 {
    30_000
}

fn default_force_timeout_ms() -> u64 {
    5_000
}

fn default_batch_concurrency() -> usize {
    crate::workflow::DEFAULT_BATCH_CONCURRENCY
}
