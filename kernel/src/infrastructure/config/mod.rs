//! Configuration management for the kill-switch.
//!
//! This module provides structured configuration for telemetry, workflow
//! cancellation and the branch kill-switch.
//!
//! # Example
//!
//! ```
//! use branch_killswitch::infrastructure::config::Settings;
//!
//! let settings = Settings::new().expect("Failed to load configuration");
//! assert_eq!(settings.kill_switch.cascade_timeout_multiplier, 10);
//! ```

pub mod cancellation;
pub mod kill_switch;
pub mod telemetry;

pub use cancellation::{CancellationSettings, CancellerBackend};
pub use kill_switch::KillSwitchSettings;
pub use telemetry::TelemetrySettings;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "KILLSWITCH";

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
    /// Workflow cancellation settings.
    #[serde(default)]
    pub cancellation: CancellationSettings,
    /// Kill-switch settings.
    #[serde(default)]
    pub kill_switch: KillSwitchSettings,
}

impl Settings {
    /// Creates a new settings instance from environment variables and defaults.
    ///
    /// Variables use the `KILLSWITCH` prefix and `__` as the section separator,
    /// e.g. `KILLSWITCH__CANCELLATION__FORCE_TIMEOUT_MS=2000`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_environment(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Builds settings from defaults overlaid with the given environment source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Start with default values
            .set_default("telemetry.service_name", "branch-killswitch")?
            .set_default("telemetry.sampling_ratio", 1.0)?
            .set_default("telemetry.log_level", "info")?
            // Merge in Environment variables
            .add_source(environment)
            .build()?;

        s.try_deserialize()
    }
}
