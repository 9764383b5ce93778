//! Scheduler Error Types

use thiserror::Error;

/// Misuse of the watcher lifecycle
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Subscriptions and cadence are fixed once polling starts
    #[error("Watcher is already polling")]
    AlreadyRunning,

    /// Nothing to poll
    #[error("No commands are being watched")]
    NoSubscriptions,

    /// The session was released by an earlier stop
    #[error("Session has already been released")]
    SessionReleased,
}
