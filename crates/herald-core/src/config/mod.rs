//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations of each section
//! 2. **Config file**: TOML file named by the `HERALD_CONFIG` env var
//! 3. **Environment variables**: `HERALD__SECTION__FIELD` overrides a single field
//!
//! # Configuration Sections
//!
//! - [`SchedulerConfig`]: report tick interval and concurrency
//! - [`AlertingConfig`]: evaluation interval and escalation policy
//! - [`RetentionConfig`]: artifact and resolved-alert retention
//! - [`DistributionConfig`]: channel timeout and acknowledged re-notification
//! - [`StorageConfig`]: artifact store backend
//! - [`EventsConfig`]: lifecycle event buffer
//! - [`LoggingConfig`]: log level and format
//!
//! `reports` and `alert_rules` seed definitions and rules at startup. They go through the same
//! validation as host commands.
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! tick_interval_seconds = 30
//! max_concurrent_reports = 4
//!
//! [storage]
//! backend = "sqlite"
//! database_url = "sqlite://herald.db"
//!
//! [[reports]]
//! name = "Daily sales"
//! data_source = "business"
//! format = "csv"
//! distribution_methods = ["log"]
//! schedule = { frequency = "daily", time = "09:00" }
//! ```

use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{alerts::types::AlertRuleRequest, report::types::ReportDefinitionRequest};

pub use crate::{
    alerts::AlertingConfig, distribution::DistributionConfig, report::SchedulerConfig,
    retention::RetentionConfig,
};

/// Artifact store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `"memory"` or `"sqlite"`. Defaults to `"memory"`.
    pub backend: String,

    /// Database URL for the `sqlite` backend. Defaults to `"sqlite://herald.db"`.
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: "memory".to_string(), database_url: "sqlite://herald.db".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it starts lagging. Defaults to `256`.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { channel_capacity: 256 }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub alerting: AlertingConfig,
    pub retention: RetentionConfig,
    pub distribution: DistributionConfig,
    pub storage: StorageConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,

    /// Report definitions created at startup.
    pub reports: Vec<ReportDefinitionRequest>,

    /// Alert rules created at startup.
    pub alert_rules: Vec<AlertRuleRequest>,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `HERALD__` prefix can override any configuration value.
    /// Use `__` as a separator for nested fields (e.g., `HERALD__SCHEDULER__ENABLED=false`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("storage.backend", "memory")?
            .set_default("storage.database_url", "sqlite://herald.db")?
            .set_default("events.channel_capacity", 256)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("HERALD").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `HERALD_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("HERALD_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates intervals, limits and enumerated string settings.
    ///
    /// Seed definitions and rules are validated when they are created, not here.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.tick_interval_seconds == 0 {
            return Err("Scheduler tick interval must be greater than 0".to_string());
        }

        if self.scheduler.max_concurrent_reports == 0 {
            return Err("Max concurrent reports must be greater than 0".to_string());
        }

        if self.alerting.evaluation_interval_seconds == 0 {
            return Err("Alert evaluation interval must be greater than 0".to_string());
        }

        if self.alerting.escalation_timeout_seconds == 0 {
            return Err("Escalation timeout must be greater than 0".to_string());
        }

        if self.retention.sweep_interval_seconds == 0 {
            return Err("Retention sweep interval must be greater than 0".to_string());
        }

        if self.distribution.channel_timeout_ms == 0 {
            return Err("Channel timeout must be greater than 0".to_string());
        }

        if self.events.channel_capacity == 0 {
            return Err("Event channel capacity must be greater than 0".to_string());
        }

        if !["memory", "sqlite"].contains(&self.storage.backend.as_str()) {
            return Err(format!(
                "Storage backend must be 'memory' or 'sqlite', got '{}'",
                self.storage.backend
            ));
        }

        if self.storage.backend == "sqlite" && self.storage.database_url.trim().is_empty() {
            return Err("SQLite backend requires a database_url".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    #[must_use]
    pub fn scheduler_tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_seconds)
    }

    #[must_use]
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.alerting.evaluation_interval_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_seconds)
    }
}
