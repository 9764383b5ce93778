//! OBD-II Horsepower Monitor
//!
//! Finds an ELM327 adapter on a serial port or a WiFi bridge, confirms the
//! vehicle reports actual and reference engine torque, then polls RPM and
//! both torque PIDs and prints horsepower on every complete update.

use std::future::Future;

use obd_protocol::Connector;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod aggregator;
pub mod capability;
pub mod config;
pub mod discovery;
pub mod error;
pub mod horsepower;
pub mod torque;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{
    stdout_sink, AggregatorState, Channel, ReportSink, Telemetry, TelemetryAggregator,
    TelemetrySnapshot,
};
pub use config::MonitorConfig;
pub use discovery::{discover, DiscoveryConfig, Endpoint, WIFI_ENDPOINTS};
pub use error::MonitorError;
pub use horsepower::{compute, self_test_report, DerivedMetric};

/// Initialize logging; `RUST_LOG` takes precedence over `default_filter`
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// One monitoring run: discovery, capability check, polling
pub struct Monitor<'a> {
    config: MonitorConfig,
    connector: &'a dyn Connector,
    endpoints: &'a [Endpoint],
    sink: ReportSink,
}

impl<'a> Monitor<'a> {
    pub fn new(config: MonitorConfig, connector: &'a dyn Connector) -> Self {
        Self {
            config,
            connector,
            endpoints: &WIFI_ENDPOINTS,
            sink: stdout_sink(),
        }
    }

    /// Probe these network addresses instead of the factory defaults
    pub fn with_endpoints(mut self, endpoints: &'a [Endpoint]) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Send reports somewhere other than stdout
    pub fn with_sink(mut self, sink: ReportSink) -> Self {
        self.sink = sink;
        self
    }

    /// Run until `shutdown` resolves or the session fails
    pub async fn run<F>(self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        let mut session =
            discover(self.connector, self.endpoints, &self.config.discovery()).await?;

        if let Err(e) = capability::check(session.as_mut()) {
            if let MonitorError::Unsupported(names) = &e {
                print!("{}", capability::unsupported_report(names));
            }
            session.close().await;
            return Err(e);
        }

        let mut aggregator =
            TelemetryAggregator::new(session, self.config.scheduler(), self.sink);
        if let Err(e) = aggregator.start() {
            aggregator.stop().await;
            return Err(e);
        }

        info!("Monitoring horsepower, press Ctrl+C to stop");
        aggregator.run_until(shutdown).await
    }
}
