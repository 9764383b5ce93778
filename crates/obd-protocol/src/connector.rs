//! Transport Enumeration and Session Opening

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::elm327::Elm327Session;
use crate::error::ObdError;
use crate::session::{ObdSession, SessionOptions};

/// Everything connection discovery needs from the outside world
#[async_trait]
pub trait Connector: Send + Sync {
    /// Locally visible serial devices, in platform enumeration order
    fn serial_ports(&self) -> Result<Vec<String>, ObdError>;

    /// Check that `host:port` accepts TCP connections within `timeout`
    ///
    /// The probe connection is closed before returning.
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ObdError>;

    /// Open a diagnostic session
    async fn open(&self, options: SessionOptions) -> Result<Box<dyn ObdSession>, ObdError>;
}

/// Connector backed by real serial ports, sockets and ELM327 adapters
#[derive(Debug, Default, Clone, Copy)]
pub struct Elm327Connector;

impl Elm327Connector {
    /// Create a connector
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for Elm327Connector {
    fn serial_ports(&self) -> Result<Vec<String>, ObdError> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ObdError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ObdError::Timeout(timeout.as_millis() as u64))??;
        debug!("{}:{} is reachable", host, port);
        drop(stream);
        Ok(())
    }

    async fn open(&self, options: SessionOptions) -> Result<Box<dyn ObdSession>, ObdError> {
        let session = Elm327Session::open(&options).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = Elm327Connector::new();
        connector
            .probe("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_probe_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = Elm327Connector::new();
        assert!(connector
            .probe("127.0.0.1", port, Duration::from_secs(2))
            .await
            .is_err());
    }
}
