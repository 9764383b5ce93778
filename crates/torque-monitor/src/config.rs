//! Monitor configuration
//!
//! Defaults, then an optional TOML file, then `TORQUE_MONITOR_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use obd_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryConfig;
use crate::error::MonitorError;

/// File picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "torque-monitor.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TORQUE_MONITOR";

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Baud rate used on serial candidates
    pub serial_baud_rate: u32,

    /// Skip redundant adapter initialization
    pub fast: bool,

    /// Shared polling cadence (milliseconds)
    pub poll_interval_ms: u64,

    /// TCP reachability timeout per network candidate (milliseconds)
    pub probe_timeout_ms: u64,

    /// Timeout for a single adapter command (milliseconds)
    pub command_timeout_ms: u64,

    /// Consecutive failed polls of one command before giving up
    pub max_consecutive_failures: u8,

    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            serial_baud_rate: 9600,
            fast: true,
            poll_interval_ms: 100,
            probe_timeout_ms: 2000,
            command_timeout_ms: 2000,
            max_consecutive_failures: 3,
            log_filter: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, MonitorError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Settings for connection discovery
    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            baud_rate: self.serial_baud_rate,
            fast: self.fast,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }

    /// Settings for the polling loop
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}
