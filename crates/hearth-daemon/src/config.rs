//! Configuration management.

use anyhow::{Context, Result};
use hearth_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address (e.g., "0.0.0.0:8686")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Metric streaming configuration
    #[serde(default)]
    pub monitor: MonitorSection,
}

/// Metric streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Sampling tick period in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Per-client outbound queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds a client may stay silent before it is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Maximum entries returned by the process listing
    #[serde(default = "default_process_limit")]
    pub process_limit: usize,

    /// External command printing the CPU temperature in Celsius; empty
    /// uses the built-in sensors
    #[serde(default)]
    pub temperature_command: Option<String>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            queue_capacity: default_queue_capacity(),
            idle_timeout_secs: default_idle_timeout(),
            process_limit: default_process_limit(),
            temperature_command: None,
        }
    }
}

// Default value functions
fn default_listen() -> String {
    "0.0.0.0:8686".to_string()
}

fn default_interval() -> u64 {
    hearth_monitor::DEFAULT_TICK_INTERVAL_MS
}

fn default_queue_capacity() -> usize {
    hearth_monitor::DEFAULT_QUEUE_CAPACITY
}

fn default_idle_timeout() -> u64 {
    hearth_monitor::DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_process_limit() -> usize {
    hearth_monitor::process::DEFAULT_PROCESS_LIMIT
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Builds the monitor core configuration.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick_interval: Duration::from_millis(self.monitor.interval_ms),
            queue_capacity: self.monitor.queue_capacity,
            idle_timeout: Duration::from_secs(self.monitor.idle_timeout_secs),
            temperature_command: self
                .monitor
                .temperature_command
                .clone()
                .filter(|command| !command.trim().is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            monitor: MonitorSection::default(),
        }
    }
}
