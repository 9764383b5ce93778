//! Watcher Implementation

use obd_protocol::{CommandDescriptor, ObdError, ObdResponse, ObdSession};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;

/// Callback invoked with every response of a watched command
pub type Callback = Box<dyn Fn(&ObdResponse) + Send + Sync + 'static>;

/// Configuration for the watcher
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between two polls of the same command (default: 100ms)
    pub poll_interval: Duration,
    /// Consecutive failed polls of one command before polling gives up
    pub max_consecutive_failures: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_consecutive_failures: 3,
        }
    }
}

/// A watched command with its timing info
#[derive(Debug, Clone)]
pub struct ScheduledCommand {
    /// The command to poll
    pub command: CommandDescriptor,
    /// Next scheduled poll
    pub next_query: Instant,
    /// Polled first when due together with non-priority commands
    pub priority: bool,
    /// Consecutive failure count
    pub failures: u8,
    /// Index of the subscription that owns the callback
    slot: usize,
}

impl ScheduledCommand {
    /// Create a command that is due immediately
    pub fn new(command: CommandDescriptor, slot: usize) -> Self {
        Self {
            command,
            next_query: Instant::now(),
            priority: command.priority,
            failures: 0,
            slot,
        }
    }

    /// Schedule next poll
    pub fn schedule_next(&mut self, interval: Duration) {
        self.next_query = Instant::now() + interval;
    }
}

impl Eq for ScheduledCommand {}

impl PartialEq for ScheduledCommand {
    fn eq(&self, other: &Self) -> bool {
        self.next_query == other.next_query
            && self.priority == other.priority
            && self.slot == other.slot
    }
}

impl Ord for ScheduledCommand {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior (earliest time first),
        // then priority commands, then subscription order
        other
            .next_query
            .cmp(&self.next_query)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

impl PartialOrd for ScheduledCommand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Subscription {
    command: CommandDescriptor,
    callback: Callback,
}

struct PollTask {
    shutdown: watch::Sender<bool>,
    fault: Option<oneshot::Receiver<ObdError>>,
    handle: JoinHandle<Box<dyn ObdSession>>,
}

/// Owns a session and polls watched commands in a background task
pub struct Watcher {
    /// Configuration
    config: SchedulerConfig,
    /// Session, held here until polling starts
    session: Option<Box<dyn ObdSession>>,
    /// Subscriptions, handed to the poll task on start
    subscriptions: Vec<Subscription>,
    /// Running poll task
    task: Option<PollTask>,
}

impl Watcher {
    /// Create a watcher around a connected session
    pub fn new(session: Box<dyn ObdSession>, config: SchedulerConfig) -> Self {
        Self {
            config,
            session: Some(session),
            subscriptions: Vec::new(),
            task: None,
        }
    }

    /// Subscribe `callback` to every poll of `command`
    pub fn watch<F>(&mut self, command: CommandDescriptor, callback: F) -> Result<(), SchedulerError>
    where
        F: Fn(&ObdResponse) + Send + Sync + 'static,
    {
        if self.task.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        debug!("Watching {}", command.name);
        self.subscriptions.push(Subscription {
            command,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Set the interval shared by all watched commands
    pub fn set_poll_interval(&mut self, interval: Duration) -> Result<(), SchedulerError> {
        if self.task.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.config.poll_interval = interval;
        Ok(())
    }

    /// Interval shared by all watched commands
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Start continuous polling
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.task.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.subscriptions.is_empty() {
            return Err(SchedulerError::NoSubscriptions);
        }
        let session = self.session.take().ok_or(SchedulerError::SessionReleased)?;
        let subscriptions = std::mem::take(&mut self.subscriptions);

        info!(
            "Starting watcher: {} commands every {:?}",
            subscriptions.len(),
            self.config.poll_interval
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fault_tx, fault_rx) = oneshot::channel();
        let handle = tokio::spawn(poll_loop(
            session,
            subscriptions,
            self.config.clone(),
            shutdown_rx,
            fault_tx,
        ));

        self.task = Some(PollTask {
            shutdown: shutdown_tx,
            fault: Some(fault_rx),
            handle,
        });
        Ok(())
    }

    /// Check if the poll task is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Wait until polling ends on its own because of a session error
    ///
    /// Never resolves while polling is healthy or when it was never started.
    pub async fn fault(&mut self) -> ObdError {
        if let Some(rx) = self.task.as_mut().and_then(|t| t.fault.as_mut()) {
            let received = rx.await;
            if let Some(task) = self.task.as_mut() {
                task.fault = None;
            }
            if let Ok(err) = received {
                return err;
            }
        }
        std::future::pending().await
    }

    /// Stop polling and release the session
    ///
    /// Safe to call in any state; the session is closed at most once.
    pub async fn stop(&mut self) {
        let session = match self.task.take() {
            Some(task) => {
                info!("Stopping watcher");
                let _ = task.shutdown.send(true);
                match task.handle.await {
                    Ok(session) => Some(session),
                    Err(e) => {
                        error!("Poll task ended abnormally: {}", e);
                        None
                    }
                }
            }
            None => self.session.take(),
        };

        if let Some(mut session) = session {
            session.close().await;
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Watcher dropped while polling, aborting poll task");
            let _ = task.shutdown.send(true);
            task.handle.abort();
        }
    }
}

async fn poll_loop(
    mut session: Box<dyn ObdSession>,
    subscriptions: Vec<Subscription>,
    config: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
    fault_tx: oneshot::Sender<ObdError>,
) -> Box<dyn ObdSession> {
    let mut queue: BinaryHeap<ScheduledCommand> = subscriptions
        .iter()
        .enumerate()
        .map(|(slot, s)| ScheduledCommand::new(s.command, slot))
        .collect();

    while let Some(mut scheduled) = queue.pop() {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep_until(scheduled.next_query) => {}
        }

        let fault = match session.query(&scheduled.command).await {
            Ok(response) => {
                scheduled.failures = 0;
                (subscriptions[scheduled.slot].callback)(&response);
                None
            }
            Err(e) if e.is_fatal() => {
                error!("Polling {} failed: {}", scheduled.command.name, e);
                Some(e)
            }
            Err(e) => {
                scheduled.failures += 1;
                warn!(
                    "Polling {} failed (attempt {}): {}",
                    scheduled.command.name, scheduled.failures, e
                );
                (scheduled.failures >= config.max_consecutive_failures).then_some(e)
            }
        };

        if let Some(e) = fault {
            let _ = fault_tx.send(e);
            break;
        }

        scheduled.schedule_next(config.poll_interval);
        queue.push(scheduled);
    }

    info!("Poll task stopped");
    session
}
