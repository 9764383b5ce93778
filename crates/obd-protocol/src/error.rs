//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port or socket failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Command not registered or not supported by vehicle
    #[error("Command {0} not supported")]
    CommandNotSupported(String),

    /// Adapter not responding
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// Session was closed or the peer hung up
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ObdError {
    /// Whether this error ends a polling session rather than a single poll
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ObdError::Transport(_) | ObdError::ConnectionClosed | ObdError::AdapterNotResponding
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ObdError::ConnectionClosed.is_fatal());
        assert!(ObdError::Transport("broken pipe".into()).is_fatal());
        assert!(!ObdError::Timeout(2000).is_fatal());
        assert!(!ObdError::InvalidResponse("?".into()).is_fatal());
    }
}
