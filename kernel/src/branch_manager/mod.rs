//! Branch state registry for the kill-switch.
//!
//! This module provides the branch domain types and the registry that is the
//! authoritative record of which branches have been killed.

pub mod storage;
pub mod types;

// Re-export primary types for convenience
pub use storage::BranchRegistry;
pub use types::{BranchError, BranchId, BranchState, BranchStatus, KillStats, KillTransition};
