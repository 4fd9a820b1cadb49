//! Telemetry configuration.
//!
//! This module defines logging, OpenTelemetry and metrics settings.

use serde::Deserialize;

/// Telemetry configuration settings.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    /// Service name for telemetry.
    pub service_name: String,
    /// OTLP endpoint for traces.
    pub otlp_endpoint: Option<String>,
    /// Sampling ratio for traces.
    #[serde(default = "default_sampling")]
    pub sampling_ratio: f64,
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Install the Prometheus metrics recorder.
    #[serde(default)]
    pub metrics: bool,
}

fn default_sampling() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}
