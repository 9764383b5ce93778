//! Monitor Error Types

use obd_protocol::ObdError;
use obd_scheduler::SchedulerError;
use thiserror::Error;

/// Errors that end a monitoring run
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Every serial and network candidate failed
    #[error("Could not connect to any OBD-II device")]
    NoDevice,

    /// The vehicle lacks commands needed for the horsepower figure
    #[error("Required PIDs not supported by vehicle: {}", .0.join(", "))]
    Unsupported(Vec<&'static str>),

    /// The session failed after polling started
    #[error("OBD session failed: {0}")]
    Session(#[from] ObdError),

    /// Watcher lifecycle misuse
    #[error("Watcher error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MonitorError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::Config(_) => 2,
            _ => 1,
        }
    }
}
