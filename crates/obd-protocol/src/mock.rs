//! In-memory session for testing (no adapter required)

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::command::{CommandDescriptor, ObdMessage, ObdResponse};
use crate::error::ObdError;
use crate::pid::{self, SupportedPids};
use crate::protocol::ObdProtocol;
use crate::session::ObdSession;

/// One scripted answer to a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// A single message carrying these payload bytes
    Payload(Vec<u8>),
    /// The vehicle answered `NO DATA`
    NoData,
    /// The adapter did not answer in time
    Timeout,
    /// The transport went away
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    closed: bool,
    queries: Vec<String>,
    replies: HashMap<u8, VecDeque<MockReply>>,
}

/// Observes and scripts a [`MockSession`] after it has been moved elsewhere
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Queue a reply for `pid`; the last queued reply repeats forever
    pub fn push_reply(&self, pid: u8, reply: MockReply) {
        self.state.lock().replies.entry(pid).or_default().push_back(reply);
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Names of the commands polled so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().queries.clone()
    }

    /// Number of polls so far
    pub fn query_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    fn next_reply(&self, pid: u8) -> MockReply {
        let mut state = self.state.lock();
        match state.replies.get_mut(&pid) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockReply::NoData),
            Some(queue) => queue.front().cloned().unwrap_or(MockReply::NoData),
            None => MockReply::NoData,
        }
    }
}

/// Scripted session standing in for a vehicle
pub struct MockSession {
    connected: bool,
    protocol: ObdProtocol,
    supported: SupportedPids,
    catalog: HashMap<&'static str, CommandDescriptor>,
    handle: MockHandle,
}

impl MockSession {
    /// A session whose vehicle answered, advertising only RPM
    pub fn connected() -> Self {
        let rpm = pid::rpm();
        Self {
            connected: true,
            protocol: ObdProtocol::Iso15765_4Can11bit500,
            supported: [rpm.pid].into_iter().collect(),
            catalog: HashMap::from([(rpm.name, rpm)]),
            handle: MockHandle::default(),
        }
    }

    /// A session whose adapter answered but whose vehicle did not
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            supported: SupportedPids::new(),
            ..Self::connected()
        }
    }

    /// Advertise additional PIDs
    pub fn with_supported(mut self, pids: &[u8]) -> Self {
        for &pid in pids {
            self.supported.insert(pid);
        }
        self
    }

    /// Queue a reply for `pid`
    pub fn with_reply(self, pid: u8, reply: MockReply) -> Self {
        self.handle.push_reply(pid, reply);
        self
    }

    /// Handle for observing the session after it is boxed
    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl ObdSession for MockSession {
    fn is_connected(&self) -> bool {
        self.connected && !self.handle.is_closed()
    }

    fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    fn register(&mut self, command: CommandDescriptor) {
        self.catalog.insert(command.name, command);
    }

    fn supports(&self, command: &CommandDescriptor) -> bool {
        self.catalog.contains_key(command.name) && self.supported.contains(command.pid)
    }

    async fn query(&mut self, command: &CommandDescriptor) -> Result<ObdResponse, ObdError> {
        if self.handle.is_closed() {
            return Err(ObdError::ConnectionClosed);
        }
        if !self.catalog.contains_key(command.name) {
            return Err(ObdError::CommandNotSupported(command.name.to_string()));
        }

        self.handle.state.lock().queries.push(command.name.to_string());

        let messages = match self.handle.next_reply(command.pid) {
            MockReply::Payload(data) => vec![ObdMessage::new(data)],
            MockReply::NoData => Vec::new(),
            MockReply::Timeout => return Err(ObdError::Timeout(0)),
            MockReply::Disconnect => return Err(ObdError::ConnectionClosed),
        };
        debug!("Mock reply for {}: {:?}", command.name, messages);

        Ok(ObdResponse::decode(command, messages))
    }

    async fn close(&mut self) {
        self.handle.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_session_creation() {
        let session = MockSession::connected();
        assert!(session.is_connected());
        assert!(session.supports(&pid::rpm()));
        assert!(!MockSession::disconnected().is_connected());
    }

    #[tokio::test]
    async fn test_scripted_replies() {
        let mut session = MockSession::connected()
            .with_reply(0x0C, MockReply::NoData)
            .with_reply(0x0C, MockReply::Payload(vec![0x2E, 0xE0]));
        let handle = session.handle();

        assert!(session.query(&pid::rpm()).await.unwrap().is_null());
        // 0x2EE0 / 4 = 3000, and the last reply repeats
        assert_eq!(session.query(&pid::rpm()).await.unwrap().value(), Some(3000.0));
        assert_eq!(session.query(&pid::rpm()).await.unwrap().value(), Some(3000.0));
        assert_eq!(handle.query_count(), 3);
    }

    #[tokio::test]
    async fn test_close_is_observable() {
        let mut session = MockSession::connected();
        let handle = session.handle();

        session.close().await;
        assert!(handle.is_closed());
        assert!(matches!(
            session.query(&pid::rpm()).await,
            Err(ObdError::ConnectionClosed)
        ));
    }
}
