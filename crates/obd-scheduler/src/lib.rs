//! OBD-II Watcher for Continuous Polling
//!
//! Polls a set of subscribed commands on a shared cadence, scheduling each
//! one independently, and hands every response to that command's callback.

mod error;
mod scheduler;

pub use error::SchedulerError;
pub use scheduler::{Callback, ScheduledCommand, SchedulerConfig, Watcher};
