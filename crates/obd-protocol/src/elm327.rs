//! ELM327 Session
//!
//! Speaks the ELM327 line protocol: every command is terminated with a
//! carriage return and every answer ends with the `>` prompt. Works over any
//! byte stream, so serial ports and WiFi bridges share one implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::command::{CommandDescriptor, ObdMessage, ObdResponse};
use crate::error::ObdError;
use crate::mode;
use crate::pid::{self, SupportedPids};
use crate::protocol::ObdProtocol;
use crate::session::{ObdSession, SessionOptions, Transport};

/// The first vehicle query may trigger a protocol search on the adapter
const PROTOCOL_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter prompt byte
const PROMPT: u8 = b'>';

trait AdapterIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AdapterIo for T {}

/// OBD-II session over an ELM327-compatible adapter
pub struct Elm327Session {
    /// Transport description for logs
    label: String,
    /// Byte stream to the adapter, `None` once closed
    io: Option<Box<dyn AdapterIo>>,
    /// Protocol in use
    protocol: ObdProtocol,
    /// Skip reset and request single responses
    fast: bool,
    /// Command timeout
    timeout: Duration,
    /// Whether the vehicle answered the 0100 query
    connected: bool,
    /// PIDs advertised by the vehicle
    supported: SupportedPids,
    /// Commands this session may poll
    catalog: HashMap<&'static str, CommandDescriptor>,
}

impl Elm327Session {
    /// Open the transport described by `options` and initialize the adapter
    ///
    /// A session whose vehicle did not answer is still returned; check
    /// [`ObdSession::is_connected`].
    pub async fn open(options: &SessionOptions) -> Result<Self, ObdError> {
        info!("Opening OBD session on {}", options.transport);

        let io: Box<dyn AdapterIo> = match &options.transport {
            Transport::Serial { path, baud_rate } => {
                let port = tokio_serial::new(path.as_str(), *baud_rate)
                    .timeout(options.timeout)
                    .open_native_async()?;
                Box::new(port)
            }
            Transport::Socket { host, port } => {
                let stream = tokio::time::timeout(
                    options.timeout,
                    TcpStream::connect((host.as_str(), *port)),
                )
                .await
                .map_err(|_| ObdError::Timeout(options.timeout.as_millis() as u64))??;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
        };

        Self::initialize(io, options).await
    }

    /// Initialize a session over an already connected byte stream
    pub async fn with_io<S>(io: S, options: &SessionOptions) -> Result<Self, ObdError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::initialize(Box::new(io), options).await
    }

    async fn initialize(io: Box<dyn AdapterIo>, options: &SessionOptions) -> Result<Self, ObdError> {
        let rpm = pid::rpm();
        let mut session = Self {
            label: options.transport.to_string(),
            io: Some(io),
            protocol: options.protocol.unwrap_or_default(),
            fast: options.fast,
            timeout: options.timeout,
            connected: false,
            supported: SupportedPids::new(),
            catalog: HashMap::from([(rpm.name, rpm)]),
        };

        if session.fast {
            debug!("Fast mode: skipping adapter reset");
        } else {
            let timeout = session.timeout;
            let banner = session.send("ATZ", timeout).await?;
            debug!("Adapter identified as {:?}", banner);
        }

        for cmd in ["ATE0", "ATL0", "ATH0"] {
            session.expect_ok(cmd).await.map_err(|e| match e {
                ObdError::Timeout(_) => ObdError::AdapterNotResponding,
                e => e,
            })?;
        }
        let select_protocol = session.protocol.to_elm_command();
        session.expect_ok(&select_protocol).await?;

        session.load_supported_pids().await?;

        if session.connected {
            let timeout = session.timeout;
            let answer = session.send("ATDPN", timeout).await?;
            if let Some(protocol) = answer
                .first()
                .and_then(|a| ObdProtocol::from_describe_number(a))
            {
                session.protocol = protocol;
            }
            info!(
                "Vehicle connected on {} using {} ({} bus, {} PIDs supported)",
                session.label,
                session.protocol,
                if session.protocol.is_can() { "CAN" } else { "legacy" },
                session.supported.len()
            );
        } else {
            warn!("Adapter on {} answered but the vehicle did not", session.label);
        }

        Ok(session)
    }

    /// Walk the supported-PID bitmaps (0100, 0120, ...) while the vehicle
    /// advertises a next range
    async fn load_supported_pids(&mut self) -> Result<(), ObdError> {
        let mut base = 0x00u8;
        let mut timeout = self.timeout.max(PROTOCOL_SEARCH_TIMEOUT);

        loop {
            let request = self.request_code(mode::CURRENT_DATA, base);
            let lines = self.send(&request, timeout).await?;
            timeout = self.timeout;

            let messages = parse_messages(&lines, mode::CURRENT_DATA, base);
            let Some(bitmap) = messages.first().filter(|m| m.data.len() >= 4) else {
                debug!("No bitmap for PID {:02X}: {:?}", base, lines);
                break;
            };

            self.supported.merge_bitmap(base, &bitmap.data);

            if !self.supported.has_next_range(base) {
                break;
            }
            base += 0x20;
        }

        // An all-zero bitmap advertises nothing worth polling
        self.connected = !self.supported.is_empty();
        Ok(())
    }

    fn request_code(&self, mode: u8, pid: u8) -> String {
        if self.fast {
            format!("{:02X}{:02X}1", mode, pid)
        } else {
            format!("{:02X}{:02X}", mode, pid)
        }
    }

    async fn expect_ok(&mut self, cmd: &str) -> Result<(), ObdError> {
        let timeout = self.timeout;
        let lines = self.send(cmd, timeout).await?;
        if lines.iter().any(|l| l.contains("OK")) {
            Ok(())
        } else {
            Err(ObdError::InvalidResponse(format!("{} -> {:?}", cmd, lines)))
        }
    }

    /// Send one command and collect the answer lines up to the prompt
    async fn send(&mut self, cmd: &str, timeout: Duration) -> Result<Vec<String>, ObdError> {
        let io = self.io.as_mut().ok_or(ObdError::ConnectionClosed)?;

        discard_stale(io).await?;

        debug!("-> {}", cmd);
        io.write_all(format!("{}\r", cmd).as_bytes()).await?;
        io.flush().await?;

        let raw = tokio::time::timeout(timeout, read_until_prompt(io))
            .await
            .map_err(|_| ObdError::Timeout(timeout.as_millis() as u64))??;

        let lines = split_lines(&raw, cmd);
        debug!("<- {:?}", lines);
        Ok(lines)
    }
}

/// Drop whatever the adapter sent since the last prompt
///
/// A command that timed out may still be answered later; that answer must
/// not be taken for the reply to the next command.
async fn discard_stale(io: &mut Box<dyn AdapterIo>) -> Result<(), ObdError> {
    let mut buf = [0u8; 128];

    while let Ok(read) = tokio::time::timeout(Duration::ZERO, io.read(&mut buf)).await {
        match read? {
            0 => return Err(ObdError::ConnectionClosed),
            n => debug!("Discarded {} stale bytes", n),
        }
    }
    Ok(())
}

/// Read one answer up to the prompt
///
/// The adapter sends nothing after `>` until it gets a new command, so any
/// trailing bytes in the same read are noise and are dropped.
async fn read_until_prompt(io: &mut Box<dyn AdapterIo>) -> Result<Vec<u8>, ObdError> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 128];

    loop {
        let n = io.read(&mut buf).await?;
        if n == 0 {
            return Err(ObdError::ConnectionClosed);
        }
        if let Some(pos) = buf[..n].iter().position(|&b| b == PROMPT) {
            raw.extend_from_slice(&buf[..pos]);
            return Ok(raw);
        }
        raw.extend_from_slice(&buf[..n]);
    }
}

/// Split an adapter answer into meaningful lines, dropping the echo and
/// progress chatter
fn split_lines(raw: &[u8], echo: &str) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != echo && !l.starts_with("SEARCHING"))
        .map(str::to_string)
        .collect()
}

/// Keep the lines that answer `mode`/`pid` and strip the echo bytes
///
/// Anything else (`NO DATA`, `STOPPED`, other PIDs) is skipped, so a poll
/// without an answer yields no messages.
fn parse_messages(lines: &[String], mode: u8, pid: u8) -> Vec<ObdMessage> {
    let response_mode = mode + mode::RESPONSE_OFFSET;

    lines
        .iter()
        .filter_map(|line| hex::decode(line.replace(' ', "")).ok())
        .filter(|bytes| bytes.len() >= 2 && bytes[0] == response_mode && bytes[1] == pid)
        .map(|bytes| ObdMessage::new(bytes[2..].to_vec()))
        .collect()
}

#[async_trait]
impl ObdSession for Elm327Session {
    fn is_connected(&self) -> bool {
        self.connected && self.io.is_some()
    }

    fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    fn register(&mut self, command: CommandDescriptor) {
        debug!("Registering command {} ({})", command.name, command.request());
        self.catalog.insert(command.name, command);
    }

    fn supports(&self, command: &CommandDescriptor) -> bool {
        self.catalog.contains_key(command.name) && self.supported.contains(command.pid)
    }

    async fn query(&mut self, command: &CommandDescriptor) -> Result<ObdResponse, ObdError> {
        if !self.catalog.contains_key(command.name) {
            return Err(ObdError::CommandNotSupported(command.name.to_string()));
        }

        let request = self.request_code(command.mode, command.pid);
        let timeout = self.timeout;
        let lines = self.send(&request, timeout).await?;
        let messages = parse_messages(&lines, command.mode, command.pid);

        Ok(ObdResponse::decode(command, messages))
    }

    async fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            info!("Closing OBD session on {}", self.label);
            // Protocol close; the adapter's answer is not awaited
            let _ = io.write_all(b"ATPC\r").await;
            let _ = io.shutdown().await;
        }
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    /// Minimal adapter that answers each command from a fixed table
    fn spawn_adapter(script: Vec<(&'static str, &'static str)>) -> DuplexStream {
        let (client, mut adapter) = tokio::io::duplex(1024);

        tokio::spawn(async move {
            let mut pending = Vec::new();
            let mut buf = [0u8; 64];
            loop {
                let n = match adapter.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                pending.extend_from_slice(&buf[..n]);

                while let Some(pos) = pending.iter().position(|&b| b == b'\r') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    let command = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
                    let reply = script
                        .iter()
                        .find(|(c, _)| *c == command)
                        .map(|(_, r)| *r)
                        .unwrap_or("?");
                    let answer = format!("{}\r\r>", reply);
                    if adapter.write_all(answer.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });

        client
    }

    fn setup_script() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ATE0", "OK"),
            ("ATL0", "OK"),
            ("ATH0", "OK"),
            ("ATSP0", "OK"),
            ("01001", "SEARCHING...\r41 00 BE 1F A8 13"),
            ("01201", "41 20 80 00 00 01"),
            ("01401", "41 40 00 00 00 01"),
            ("01601", "41 60 60 00 00 00"),
            ("ATDPN", "A6"),
        ]
    }

    fn fast_options() -> SessionOptions {
        SessionOptions::socket("adapter", 35000).fast(true)
    }

    fn percent_torque() -> CommandDescriptor {
        CommandDescriptor::new("PERCENT", "Percent torque", 0x62, 1, |m: &[ObdMessage]| {
            m.first()?.data.first().map(|&a| a as f64 - 125.0)
        })
    }

    #[tokio::test]
    async fn test_fast_open_and_query() {
        let mut script = setup_script();
        script.push(("010C1", "41 0C 1A F8"));

        let mut session = Elm327Session::with_io(spawn_adapter(script), &fast_options())
            .await
            .unwrap();

        assert!(session.is_connected());
        assert_eq!(session.protocol(), ObdProtocol::Iso15765_4Can11bit500);
        assert!(session.protocol().is_can());
        assert!(session.supports(&pid::rpm()));

        // (0x1A * 256 + 0xF8) / 4 = 1726
        let response = session.query(&pid::rpm()).await.unwrap();
        assert_eq!(response.value(), Some(1726.0));
    }

    #[tokio::test]
    async fn test_custom_command_needs_registration() {
        let mut session = Elm327Session::with_io(spawn_adapter(setup_script()), &fast_options())
            .await
            .unwrap();

        let cmd = percent_torque();
        assert!(!session.supports(&cmd));
        assert!(matches!(
            session.query(&cmd).await,
            Err(ObdError::CommandNotSupported(_))
        ));

        session.register(cmd);
        assert!(session.supports(&cmd));
    }

    #[tokio::test]
    async fn test_no_data_is_null() {
        let mut script = setup_script();
        script.push(("01621", "NO DATA"));

        let mut session = Elm327Session::with_io(spawn_adapter(script), &fast_options())
            .await
            .unwrap();
        session.register(percent_torque());

        let response = session.query(&percent_torque()).await.unwrap();
        assert!(response.is_null());
    }

    #[tokio::test]
    async fn test_vehicle_not_answering() {
        let script = vec![
            ("ATE0", "OK"),
            ("ATL0", "OK"),
            ("ATH0", "OK"),
            ("ATSP0", "OK"),
            ("01001", "SEARCHING...\rUNABLE TO CONNECT"),
        ];

        let session = Elm327Session::with_io(spawn_adapter(script), &fast_options())
            .await
            .unwrap();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_silent_adapter() {
        let (client, _adapter) = tokio::io::duplex(64);
        let options = fast_options().timeout(Duration::from_millis(50));

        let result = Elm327Session::with_io(client, &options).await;
        assert!(matches!(result, Err(ObdError::AdapterNotResponding)));
    }

    #[tokio::test]
    async fn test_query_after_close() {
        let mut session = Elm327Session::with_io(spawn_adapter(setup_script()), &fast_options())
            .await
            .unwrap();

        session.close().await;
        assert!(!session.is_connected());

        let err = session.query(&pid::rpm()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_late_answer_is_not_taken_for_next_reply() {
        let (client, mut adapter) = tokio::io::duplex(256);
        let mut io: Box<dyn AdapterIo> = Box::new(client);

        // Answer to a poll that already timed out
        adapter.write_all(b"41 0C 00 00\r\r>").await.unwrap();
        discard_stale(&mut io).await.unwrap();

        adapter.write_all(b"41 0C 1A F8\r\r>").await.unwrap();
        let raw = read_until_prompt(&mut io).await.unwrap();
        assert_eq!(split_lines(&raw, "010C"), vec!["41 0C 1A F8".to_string()]);
    }

    #[tokio::test]
    async fn test_discard_stale_detects_hangup() {
        let (client, adapter) = tokio::io::duplex(64);
        let mut io: Box<dyn AdapterIo> = Box::new(client);
        drop(adapter);

        assert!(matches!(
            discard_stale(&mut io).await,
            Err(ObdError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_parse_messages_filters_other_pids() {
        let lines = vec![
            "41 0C 1A F8".to_string(),
            "41 0D 55".to_string(),
            "NO DATA".to_string(),
        ];
        let messages = parse_messages(&lines, 0x01, 0x0C);
        assert_eq!(messages, vec![ObdMessage::new(vec![0x1A, 0xF8])]);
    }

    #[test]
    fn test_split_lines_drops_echo() {
        let lines = split_lines(b"010C\r41 0C 1A F8\r\r", "010C");
        assert_eq!(lines, vec!["41 0C 1A F8".to_string()]);
    }
}
