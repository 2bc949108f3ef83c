use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::deserialize_duration_from_seconds;

/// Provides the default value for shutdown_timeout.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for maintenance_interval.
fn default_maintenance_interval() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for alert_retention.
fn default_alert_retention() -> Duration {
    Duration::from_secs(120 * 60 * 60)
}

/// Provides the default value for alert_gc_interval.
fn default_alert_gc_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Provides the default value for alert_channel_capacity.
fn default_alert_channel_capacity() -> usize {
    1024
}

/// Application configuration for Herald.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Path to the routing tree configuration file.
    #[serde(skip_deserializing)]
    pub routes_config_path: PathBuf,

    /// The interval in seconds between two passes reclaiming empty groups.
    #[serde(
        rename = "maintenance_interval_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_maintenance_interval"
    )]
    pub maintenance_interval: Duration,

    /// The maximum number of concurrent aggregation groups. 0 means no
    /// limit.
    #[serde(default)]
    pub max_aggregation_groups: usize,

    /// The lower bound in seconds of the time a single notification attempt
    /// may take. 0 bounds every attempt by the group interval alone.
    #[serde(
        rename = "min_notify_timeout_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default
    )]
    pub min_notify_timeout: Duration,

    /// How long in seconds resolved alerts stay in the alert source.
    #[serde(
        rename = "alert_retention_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_alert_retention"
    )]
    pub alert_retention: Duration,

    /// The interval in seconds between two alert source garbage collections.
    #[serde(
        rename = "alert_gc_interval_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_alert_gc_interval"
    )]
    pub alert_gc_interval: Duration,

    /// The maximum time in seconds to wait for graceful shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    /// The capacity of the channel fanning alerts out to subscribers.
    #[serde(default = "default_alert_channel_capacity")]
    pub alert_channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            routes_config_path: PathBuf::from("configs/routes.yaml"),
            maintenance_interval: default_maintenance_interval(),
            max_aggregation_groups: 0,
            min_notify_timeout: Duration::ZERO,
            alert_retention: default_alert_retention(),
            alert_gc_interval: default_alert_gc_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            alert_channel_capacity: default_alert_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading from the configuration directory.
    ///
    /// `app.yaml` is optional; every setting has a default and can be
    /// overridden with `HERALD__<SETTING>` environment variables.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)).required(false))
            .add_source(Environment::with_prefix("HERALD").separator("__").try_parsing(true))
            .build()?;
        let mut config: Self = s.try_deserialize()?;

        // Resolve the routes file relative to the config directory.
        config.routes_config_path = Path::new(config_dir_str).join("routes.yaml");

        Ok(config)
    }

    /// Creates a new `AppConfigBuilder` for testing purposes.
    #[cfg(test)]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

/// A builder for creating `AppConfig` instances for testing.
#[cfg(test)]
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn routes_config_path(mut self, path: &str) -> Self {
        self.config.routes_config_path = path.into();
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    pub fn max_aggregation_groups(mut self, limit: usize) -> Self {
        self.config.max_aggregation_groups = limit;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
