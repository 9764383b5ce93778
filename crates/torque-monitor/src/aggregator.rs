//! Telemetry Aggregator
//!
//! Keeps the latest RPM, percent torque and reference torque, each updated
//! by its own watcher callback, and reports horsepower whenever an update
//! leaves all three known.

use std::future::Future;
use std::sync::Arc;

use obd_protocol::{rpm, CommandDescriptor, ObdResponse, ObdSession};
use obd_scheduler::{SchedulerConfig, Watcher};
use parking_lot::Mutex;
use tracing::info;

use crate::error::MonitorError;
use crate::horsepower::{self, DerivedMetric};
use crate::torque::{ACTUAL_ENGINE_PERCENT_TORQUE, ENGINE_REF_TORQUE};

/// Receives every derived metric
pub type ReportSink = Arc<dyn Fn(&DerivedMetric) + Send + Sync>;

/// Sink that prints the report to stdout
pub fn stdout_sink() -> ReportSink {
    Arc::new(|metric| print!("{}", metric))
}

/// The monitored values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Rpm,
    TorquePercent,
    ReferenceTorque,
}

impl Channel {
    fn command(&self) -> CommandDescriptor {
        match self {
            Channel::Rpm => rpm(),
            Channel::TorquePercent => ACTUAL_ENGINE_PERCENT_TORQUE,
            Channel::ReferenceTorque => ENGINE_REF_TORQUE,
        }
    }
}

/// Latest observed value of each channel; `None` until first decoded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub rpm: Option<f64>,
    pub torque_percent: Option<f64>,
    pub reference_torque_nm: Option<f64>,
}

impl TelemetrySnapshot {
    fn set(&mut self, channel: Channel, value: f64) {
        let slot = match channel {
            Channel::Rpm => &mut self.rpm,
            Channel::TorquePercent => &mut self.torque_percent,
            Channel::ReferenceTorque => &mut self.reference_torque_nm,
        };
        *slot = Some(value);
    }

    /// Horsepower figures, once every channel has a value
    pub fn derive(&self) -> Option<DerivedMetric> {
        Some(horsepower::compute(
            self.rpm?,
            self.torque_percent?,
            self.reference_torque_nm?,
        ))
    }
}

/// Snapshot shared by the three callbacks
pub struct Telemetry {
    snapshot: Mutex<TelemetrySnapshot>,
    sink: ReportSink,
}

impl Telemetry {
    pub fn new(sink: ReportSink) -> Self {
        Self {
            snapshot: Mutex::new(TelemetrySnapshot::default()),
            sink,
        }
    }

    /// Apply one poll result; "no data" leaves the snapshot untouched
    pub fn record(&self, channel: Channel, response: &ObdResponse) -> Option<DerivedMetric> {
        let value = response.value()?;
        self.update(channel, value)
    }

    /// Overwrite one channel and report if the snapshot is complete
    ///
    /// Update, derivation and report happen under one lock, so concurrent
    /// callbacks never observe or print a half-applied update.
    pub fn update(&self, channel: Channel, value: f64) -> Option<DerivedMetric> {
        let mut snapshot = self.snapshot.lock();
        snapshot.set(channel, value);
        let metric = snapshot.derive()?;
        (self.sink)(&metric);
        Some(metric)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.snapshot.lock()
    }
}

/// Lifecycle of the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Unsubscribed,
    Polling,
    Stopped,
}

/// Drives the watcher and owns the session for the rest of the run
pub struct TelemetryAggregator {
    watcher: Watcher,
    telemetry: Arc<Telemetry>,
    state: AggregatorState,
}

impl TelemetryAggregator {
    pub fn new(session: Box<dyn ObdSession>, config: SchedulerConfig, sink: ReportSink) -> Self {
        Self {
            watcher: Watcher::new(session, config),
            telemetry: Arc::new(Telemetry::new(sink)),
            state: AggregatorState::Unsubscribed,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Subscribe one callback per channel and start polling
    pub fn start(&mut self) -> Result<(), MonitorError> {
        for channel in [Channel::Rpm, Channel::TorquePercent, Channel::ReferenceTorque] {
            let telemetry = self.telemetry.clone();
            self.watcher.watch(channel.command(), move |response| {
                telemetry.record(channel, response);
            })?;
        }

        self.watcher.start()?;
        self.state = AggregatorState::Polling;
        info!("Polling every {:?}", self.watcher.poll_interval());
        Ok(())
    }

    /// Poll until `shutdown` resolves or the session fails, then stop
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            _ = shutdown => {
                info!("Stopping...");
                Ok(())
            }
            err = self.watcher.fault() => Err(MonitorError::Session(err)),
        };

        self.stop().await;
        outcome
    }

    /// Stop polling and release the session
    pub async fn stop(&mut self) {
        if self.state != AggregatorState::Stopped {
            self.watcher.stop().await;
            self.state = AggregatorState::Stopped;
        }
    }
}
