//! Connection Discovery
//!
//! Tries local serial devices first, then a fixed list of WiFi adapter
//! addresses, and keeps the first session whose vehicle answers. Each
//! candidate gets exactly one attempt.

use std::fmt;
use std::time::Duration;

use obd_protocol::{Connector, ObdError, ObdSession, SessionOptions};
use tracing::{error, info, warn};

use crate::error::MonitorError;

/// A network address an adapter may listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub host: &'static str,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(host: &'static str, port: u16) -> Self {
        Self { host, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Factory-default addresses of common WiFi ELM327 bridges, probed in order
pub const WIFI_ENDPOINTS: [Endpoint; 4] = [
    Endpoint::new("192.168.0.10", 35000),
    Endpoint::new("192.168.0.10", 23),
    Endpoint::new("192.168.0.11", 35000),
    Endpoint::new("192.168.0.123", 35000),
];

/// Settings for one discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Baud rate for serial candidates
    pub baud_rate: u32,
    /// Open sessions in fast mode
    pub fast: bool,
    /// TCP reachability timeout per network candidate
    pub probe_timeout: Duration,
    /// Per-command timeout handed to the session
    pub command_timeout: Duration,
}

#[derive(Debug, Clone)]
enum Candidate {
    Serial(String),
    Network(Endpoint),
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Serial(path) => write!(f, "serial port {}", path),
            Candidate::Network(endpoint) => write!(f, "WiFi address {}", endpoint),
        }
    }
}

/// Find the first candidate transport with a live vehicle behind it
pub async fn discover(
    connector: &dyn Connector,
    endpoints: &[Endpoint],
    config: &DiscoveryConfig,
) -> Result<Box<dyn ObdSession>, MonitorError> {
    let serial_ports = connector.serial_ports().unwrap_or_else(|e| {
        warn!("Could not enumerate serial ports: {}", e);
        Vec::new()
    });
    info!("Available serial ports: {:?}", serial_ports);

    let candidates = serial_ports
        .into_iter()
        .map(Candidate::Serial)
        .chain(endpoints.iter().copied().map(Candidate::Network));

    for candidate in candidates {
        info!("Trying {}", candidate);
        match try_candidate(connector, &candidate, config).await {
            Ok(Some(session)) => {
                info!("Connected to OBD-II device on {}", candidate);
                return Ok(session);
            }
            Ok(None) => warn!("No vehicle answered on {}", candidate),
            Err(e) => warn!("Failed to connect on {}: {}", candidate, e),
        }
    }

    error!("Could not connect to any OBD-II device");
    Err(MonitorError::NoDevice)
}

async fn try_candidate(
    connector: &dyn Connector,
    candidate: &Candidate,
    config: &DiscoveryConfig,
) -> Result<Option<Box<dyn ObdSession>>, ObdError> {
    let options = match candidate {
        Candidate::Serial(path) => SessionOptions::serial(path.as_str(), config.baud_rate),
        Candidate::Network(endpoint) => {
            connector
                .probe(endpoint.host, endpoint.port, config.probe_timeout)
                .await?;
            // No baud rate and no forced protocol: the adapter autodetects
            SessionOptions::socket(endpoint.host, endpoint.port).protocol(None)
        }
    }
    .fast(config.fast)
    .timeout(config.command_timeout);

    let mut session = connector.open(options).await?;
    if session.is_connected() {
        Ok(Some(session))
    } else {
        session.close().await;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;
    use obd_protocol::mock::MockSession;

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            baud_rate: 9600,
            fast: true,
            probe_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(2),
        }
    }

    const ENDPOINTS: [Endpoint; 3] = [
        Endpoint::new("10.0.0.1", 35000),
        Endpoint::new("10.0.0.2", 35000),
        Endpoint::new("10.0.0.3", 35000),
    ];

    #[tokio::test]
    async fn test_second_network_candidate_wins() {
        let dead = MockSession::disconnected();
        let dead_handle = dead.handle();
        let live = MockSession::connected();
        let live_handle = live.handle();

        // ttyUSB0 fails to open, rfcomm0 opens but the vehicle is silent,
        // 10.0.0.1 is unreachable, 10.0.0.2 answers
        let connector = FakeConnector::new(&["/dev/ttyUSB0", "/dev/rfcomm0"])
            .with_session("/dev/rfcomm0 @ 9600 baud", dead)
            .reachable("10.0.0.2", 35000)
            .reachable("10.0.0.3", 35000)
            .with_session("socket://10.0.0.2:35000", live)
            .with_session("socket://10.0.0.3:35000", MockSession::connected());

        let session = discover(&connector, &ENDPOINTS, &config()).await.unwrap();
        assert!(session.is_connected());

        assert_eq!(
            connector.calls(),
            [
                "open /dev/ttyUSB0 @ 9600 baud fast=true protocol=None",
                "open /dev/rfcomm0 @ 9600 baud fast=true protocol=None",
                "probe 10.0.0.1:35000",
                "probe 10.0.0.2:35000",
                "open socket://10.0.0.2:35000 fast=true protocol=None",
            ]
        );
        assert!(dead_handle.is_closed());
        assert!(!live_handle.is_closed());
    }

    #[tokio::test]
    async fn test_serial_preferred_over_network() {
        let connector = FakeConnector::new(&["/dev/ttyUSB0"])
            .with_session("/dev/ttyUSB0 @ 9600 baud", MockSession::connected())
            .reachable("10.0.0.1", 35000);

        discover(&connector, &ENDPOINTS, &config()).await.unwrap();
        assert_eq!(
            connector.calls(),
            ["open /dev/ttyUSB0 @ 9600 baud fast=true protocol=None"]
        );
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let connector = FakeConnector::new(&["/dev/ttyUSB0"]).reachable("10.0.0.3", 35000);

        let Err(err) = discover(&connector, &ENDPOINTS, &config()).await else {
            panic!("discovery should fail");
        };
        assert!(matches!(err, MonitorError::NoDevice));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(connector.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_session_options_follow_config() {
        let connector = FakeConnector::new(&["/dev/ttyUSB0"])
            .reachable("10.0.0.1", 35000)
            .with_session("socket://10.0.0.1:35000", MockSession::connected());
        let config = DiscoveryConfig {
            baud_rate: 38400,
            fast: false,
            ..config()
        };

        discover(&connector, &ENDPOINTS, &config).await.unwrap();
        assert_eq!(
            connector.calls(),
            [
                "open /dev/ttyUSB0 @ 38400 baud fast=false protocol=None",
                "probe 10.0.0.1:35000",
                "open socket://10.0.0.1:35000 fast=false protocol=None",
            ]
        );
    }

    #[test]
    fn test_default_endpoints() {
        assert_eq!(WIFI_ENDPOINTS[0].to_string(), "192.168.0.10:35000");
        assert_eq!(WIFI_ENDPOINTS[1].to_string(), "192.168.0.10:23");
        assert_eq!(WIFI_ENDPOINTS[3].to_string(), "192.168.0.123:35000");
    }
}
