//! Kill-switch configuration.
//!
//! This module defines branch kill timeouts and cascade bounds.

use std::time::Duration;

use serde::Deserialize;

use crate::workflow::CancellationMode;

/// Kill-switch settings.
#[derive(Debug, Deserialize, Clone)]
pub struct KillSwitchSettings {
    /// Timeout for killing a single branch in milliseconds (default: 30000)
    #[serde(default = "default_branch_kill_timeout_ms")]
    pub branch_kill_timeout_ms: u64,

    /// Cascade bound as a multiple of the per-branch timeout (default: 10)
    #[serde(default = "default_cascade_timeout_multiplier")]
    pub cascade_timeout_multiplier: u32,

    /// Cancellation mode used when killing branches (default: graceful)
    #[serde(default)]
    pub default_mode: CancellationMode,
}

impl KillSwitchSettings {
    /// Timeout for killing a single branch.
    #[must_use]
    pub fn branch_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.branch_kill_timeout_ms)
    }
}

impl Default for KillSwitchSettings {
    fn default() -> Self {
        Self {
            branch_kill_timeout_ms: default_branch_kill_timeout_ms(),
            cascade_timeout_multiplier: default_cascade_timeout_multiplier(),
            default_mode: CancellationMode::default(),
        }
    }
}

fn default_branch_kill_timeout_ms() -> u64 {
    30_000
}

fn default_cascade_timeout_multiplier() -> u32 {
    crate::kill_switch::DEFAULT_CASCADE_MULTIPLIER
}
