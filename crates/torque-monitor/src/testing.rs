//! Scripted connector for discovery and end-to-end tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use obd_protocol::mock::MockSession;
use obd_protocol::{Connector, ObdError, ObdSession, SessionOptions};
use parking_lot::Mutex;

/// Connector that hands out pre-built mock sessions by transport label
/// and records every probe and open, along with the session options
pub(crate) struct FakeConnector {
    ports: Vec<String>,
    reachable: Vec<(String, u16)>,
    sessions: Mutex<HashMap<String, MockSession>>,
    calls: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub(crate) fn new(ports: &[&str]) -> Self {
        Self {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            reachable: Vec::new(),
            sessions: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reachable(mut self, host: &str, port: u16) -> Self {
        self.reachable.push((host.to_string(), port));
        self
    }

    /// Serve `session` when a transport displaying as `label` is opened
    pub(crate) fn with_session(self, label: &str, session: MockSession) -> Self {
        self.sessions.lock().insert(label.to_string(), session);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn serial_ports(&self) -> Result<Vec<String>, ObdError> {
        Ok(self.ports.clone())
    }

    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ObdError> {
        self.calls.lock().push(format!("probe {}:{}", host, port));
        if self.reachable.iter().any(|(h, p)| h == host && *p == port) {
            Ok(())
        } else {
            Err(ObdError::Timeout(timeout.as_millis() as u64))
        }
    }

    async fn open(&self, options: SessionOptions) -> Result<Box<dyn ObdSession>, ObdError> {
        let label = options.transport.to_string();
        self.calls.lock().push(format!(
            "open {} fast={} protocol={:?}",
            label, options.fast, options.protocol
        ));
        self.sessions
            .lock()
            .remove(&label)
            .map(|s| Box::new(s) as Box<dyn ObdSession>)
            .ok_or_else(|| ObdError::Transport(format!("no device at {}", label)))
    }
}
