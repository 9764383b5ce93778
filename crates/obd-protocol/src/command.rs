//! OBD-II Command Descriptors and Responses

use serde::{Deserialize, Serialize};

use crate::mode;

/// Decodes the messages of one poll into a value, or `None` for "no data"
pub type Decoder = fn(&[ObdMessage]) -> Option<f64>;

/// A single ECU reply to a command
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObdMessage {
    /// Payload bytes following the mode and PID echo
    pub data: Vec<u8>,
}

impl ObdMessage {
    /// Create a message from its payload bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Description of a diagnostic command that a session can poll
///
/// Descriptors are immutable once built. Sessions keep a catalog of them
/// keyed by `name`.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    /// Unique identifier (e.g. `"RPM"`)
    pub name: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Request mode (0x01 for current data)
    pub mode: u8,
    /// Parameter ID
    pub pid: u8,
    /// Number of payload bytes expected in the reply
    pub response_bytes: usize,
    /// Payload decoder
    pub decoder: Decoder,
    /// Polled ahead of other commands due at the same instant
    pub priority: bool,
}

impl CommandDescriptor {
    /// Create a mode 01 command descriptor
    pub const fn new(
        name: &'static str,
        description: &'static str,
        pid: u8,
        response_bytes: usize,
        decoder: Decoder,
    ) -> Self {
        Self {
            name,
            description,
            mode: mode::CURRENT_DATA,
            pid,
            response_bytes,
            decoder,
            priority: false,
        }
    }

    /// Set the priority flag
    pub const fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    /// Request code as sent to the adapter, e.g. `"0162"`
    pub fn request(&self) -> String {
        format!("{:02X}{:02X}", self.mode, self.pid)
    }

    /// Decode the messages of one poll
    pub fn decode(&self, messages: &[ObdMessage]) -> Option<f64> {
        (self.decoder)(messages)
    }
}

/// Result of one poll of a command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObdResponse {
    /// Name of the command that was polled
    pub command: String,
    /// Decoded value, `None` when the vehicle returned no data
    pub value: Option<f64>,
    /// Raw messages the value was decoded from
    pub messages: Vec<ObdMessage>,
    /// Timestamp when the response was received (Unix ms)
    pub timestamp_ms: u64,
}

impl ObdResponse {
    /// Build a response by running the command's decoder over `messages`
    pub fn decode(command: &CommandDescriptor, messages: Vec<ObdMessage>) -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            command: command.name.to_string(),
            value: command.decode(&messages),
            messages,
            timestamp_ms,
        }
    }

    /// Whether the poll produced no value
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Decoded value, if any
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
