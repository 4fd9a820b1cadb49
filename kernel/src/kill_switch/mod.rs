//! Branch kill-switch.
//!
//! Kills single branches or whole dependency trees. A kill always leaves the
//! branch Killed in the registry, even when its teardown runs out of time.

mod claims;
pub mod engine;
pub mod teardown;
pub mod tracking;

/// Cascade bound as a multiple of the per-branch timeout.
pub const DEFAULT_CASCADE_MULTIPLIER: u32 = 10;

pub use engine::KillSwitch;
pub use teardown::{TeardownError, TeardownHook};
pub use tracking::{KillError, TeardownReport};
