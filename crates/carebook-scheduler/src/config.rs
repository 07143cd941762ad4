use carebook_core::{DEFAULT_BUFFER_MINUTES, ExclusionWindow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::coordinator::DEFAULT_MAX_COMMIT_RETRIES;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub scheduling: SchedulingSettings,
    #[serde(default)]
    pub commit: CommitSettings,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduling.buffer_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "scheduling.buffer_minutes must be > 0".into(),
            ));
        }
        if self.delivery.subscriber_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery.subscriber_timeout_ms must be > 0".into(),
            ));
        }
        if self.delivery.diagnostics_capacity == 0 {
            return Err(ConfigError::Invalid(
                "delivery.diagnostics_capacity must be > 0".into(),
            ));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }

    pub fn exclusion_window(&self) -> Result<ExclusionWindow, ConfigError> {
        ExclusionWindow::from_minutes(self.scheduling.buffer_minutes)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn subscriber_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery.subscriber_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingSettings {
    /// Minutes blocked on each side of an appointment start.
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: i64,
}

fn default_buffer_minutes() -> i64 {
    DEFAULT_BUFFER_MINUTES
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            buffer_minutes: default_buffer_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSettings {
    /// Re-checks after the store rejects a write on its own validation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_COMMIT_RETRIES
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

/// How committed events reach subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// The scheduling call awaits every subscriber.
    Inline,
    /// A background dispatcher delivers; the scheduling call returns first.
    #[default]
    Queued,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySettings {
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default = "default_subscriber_timeout_ms")]
    pub subscriber_timeout_ms: u64,
    #[serde(default = "default_diagnostics_capacity")]
    pub diagnostics_capacity: usize,
}

fn default_subscriber_timeout_ms() -> u64 {
    5_000
}

fn default_diagnostics_capacity() -> usize {
    256
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            subscriber_timeout_ms: default_subscriber_timeout_ms(),
            diagnostics_capacity: default_diagnostics_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{ConfigError, SchedulerConfig};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Load from `path` (or `carebook.toml` when present), then apply
    /// `CAREBOOK__SECTION__KEY` environment overrides and validate.
    pub fn load_config(path: Option<&str>) -> Result<SchedulerConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or("carebook.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // e.g. CAREBOOK__COMMIT__MAX_RETRIES=5
        builder = builder.add_source(
            Environment::with_prefix("CAREBOOK")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: SchedulerConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}
