//! OBD-II Session Layer
//!
//! This crate provides async communication with ELM327-compatible OBD-II
//! adapters over a serial port or a TCP socket (WiFi bridges), plus the
//! command catalog types the rest of the workspace builds on.

mod command;
mod connector;
mod elm327;
mod error;
pub mod mock;
mod pid;
mod protocol;
mod session;

pub use command::{CommandDescriptor, Decoder, ObdMessage, ObdResponse};
pub use connector::{Connector, Elm327Connector};
pub use elm327::Elm327Session;
pub use error::ObdError;
pub use pid::{decode_rpm, rpm, SupportedPids};
pub use protocol::ObdProtocol;
pub use session::{ObdSession, SessionOptions, Transport};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Offset added to the request mode in a positive response
    pub const RESPONSE_OFFSET: u8 = 0x40;
}
