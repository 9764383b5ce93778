//! Diagnostic Session Abstraction

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::{CommandDescriptor, ObdResponse};
use crate::error::ObdError;
use crate::protocol::ObdProtocol;

/// Default timeout for a single adapter command
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Where an adapter is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Local serial device (USB or Bluetooth RFCOMM)
    Serial { path: String, baud_rate: u32 },
    /// TCP socket, typically a WiFi bridge
    Socket { host: String, port: u16 },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Serial { path, baud_rate } => write!(f, "{} @ {} baud", path, baud_rate),
            Transport::Socket { host, port } => write!(f, "socket://{}:{}", host, port),
        }
    }
}

/// Options for opening a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Transport to open
    pub transport: Transport,
    /// Protocol to force, `None` lets the adapter autodetect
    pub protocol: Option<ObdProtocol>,
    /// Skip adapter reset and ask for single-response replies
    pub fast: bool,
    /// Timeout for each adapter command
    pub timeout: Duration,
}

impl SessionOptions {
    /// Serial session options
    pub fn serial(path: impl Into<String>, baud_rate: u32) -> Self {
        Self::new(Transport::Serial {
            path: path.into(),
            baud_rate,
        })
    }

    /// Socket session options
    pub fn socket(host: impl Into<String>, port: u16) -> Self {
        Self::new(Transport::Socket {
            host: host.into(),
            port,
        })
    }

    fn new(transport: Transport) -> Self {
        Self {
            transport,
            protocol: None,
            fast: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set fast mode
    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Set the per-command timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Force a protocol
    pub fn protocol(mut self, protocol: Option<ObdProtocol>) -> Self {
        self.protocol = protocol;
        self
    }
}

/// A live connection to one vehicle over one transport
#[async_trait]
pub trait ObdSession: Send {
    /// Whether the vehicle answered during session setup
    fn is_connected(&self) -> bool;

    /// Protocol in use on the vehicle bus
    fn protocol(&self) -> ObdProtocol;

    /// Add a command to the session catalog
    fn register(&mut self, command: CommandDescriptor);

    /// Whether the command is in the catalog and advertised by the vehicle
    fn supports(&self, command: &CommandDescriptor) -> bool;

    /// Poll a command once
    async fn query(&mut self, command: &CommandDescriptor) -> Result<ObdResponse, ObdError>;

    /// Release the transport
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display() {
        let serial = SessionOptions::serial("/dev/ttyUSB0", 9600);
        assert_eq!(serial.transport.to_string(), "/dev/ttyUSB0 @ 9600 baud");

        let socket = SessionOptions::socket("192.168.0.10", 35000);
        assert_eq!(socket.transport.to_string(), "socket://192.168.0.10:35000");
    }

    #[test]
    fn test_option_builders() {
        let options = SessionOptions::serial("COM3", 9600)
            .fast(true)
            .timeout(Duration::from_millis(500));
        assert!(options.fast);
        assert_eq!(options.timeout, Duration::from_millis(500));
        assert_eq!(options.protocol, None);
    }
}
