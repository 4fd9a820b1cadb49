/// Audit logging for kill and lifecycle events.
pub mod audit;
/// Configuration management for the kill-switch.
pub mod config;
/// Telemetry setup for logging, tracing, and metrics.
pub mod telemetry;
