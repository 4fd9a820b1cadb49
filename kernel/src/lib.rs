//! Branch kill-switch - core library for terminating branches of work.
//!
//! This crate provides single and cascading branch kills with timeout
//! enforcement, mode-aware workflow cancellation, and the coordinator that
//! wires them together.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Branch state registry and domain types.
pub mod branch_manager;
/// Coordinator facade over the kill-switch and canceller.
pub mod coordinator;
/// Infrastructure components (audit, config, telemetry).
pub mod infrastructure;
/// Single and cascading branch kills.
pub mod kill_switch;
/// Workflow cancellation subsystem.
pub mod workflow;

pub use coordinator::Coordinator;
