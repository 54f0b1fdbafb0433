//! Request-reply client for the calculation engine.
//!
//! This module provides `EngineClient`, a blocking client that holds one
//! REQ socket connected to the engine and performs strictly alternating
//! request-reply exchanges with a timeout on each.

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::protocol::WireProtocol;
use super::transport::{Transport, TransportKind};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Address the engine listens on unless configured otherwise.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:33242";

/// IPC-specific error types.
///
/// These errors provide actionable messages for common failure modes
/// when communicating with the engine.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Failed to connect to the engine endpoint.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Request timed out waiting for a reply.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The engine closed the connection.
    #[error("Connection closed by engine")]
    Closed,

    /// Protocol-level error (encoding).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// nng socket failure.
    #[error("nng error: {0}")]
    Nng(#[source] nng::Error),

    /// libzmq socket failure.
    #[error("ZeroMQ error: {0}")]
    Zmq(#[source] zmq::Error),
}

impl IpcError {
    /// Returns true if the engine is gone (hung up or stopped answering).
    pub fn is_disconnect(&self) -> bool {
        matches!(self, IpcError::Closed | IpcError::Timeout(_))
    }
}

/// One reply from the engine, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply body exactly as received.
    pub body: Vec<u8>,
    /// The engine signalled that it is shutting down.
    pub quit: bool,
}

impl Reply {
    /// Reply body as text for printing (invalid UTF-8 is replaced).
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Reply used when the engine stopped answering after `quit`.
    pub fn hangup() -> Self {
        Self {
            body: Vec::new(),
            quit: true,
        }
    }
}

/// Request-reply client for the calculation engine.
///
/// # Connection Lifecycle
///
/// - `connect()` - Open the REQ socket and connect it
/// - `connect_with_retry()` - Retry connection with exponential backoff
/// - `request()` - Send one message and wait for its reply (with timeout)
///
/// # Example
///
/// ```ignore
/// use rpn_term::ipc::{EngineClient, TransportKind, WireProtocol};
///
/// let mut client =
///     EngineClient::connect("127.0.0.1:33242", TransportKind::Zmtp, WireProtocol::Raw)?;
/// let reply = client.request("3")?;
/// println!("{}", reply.text());
/// ```
pub struct EngineClient {
    transport: Transport,
    protocol: WireProtocol,
    /// Request timeout duration.
    timeout: Duration,
}

impl EngineClient {
    /// Connect to the engine at `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionFailed` if the engine cannot be reached.
    pub fn connect(
        address: &str,
        kind: TransportKind,
        protocol: WireProtocol,
    ) -> Result<Self, IpcError> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let transport = Transport::connect(kind, address, timeout)?;
        info!("Connected to engine ({} transport, {} protocol)", kind, protocol);

        Ok(Self {
            transport,
            protocol,
            timeout,
        })
    }

    /// Connect with automatic retry and exponential backoff.
    ///
    /// A freshly spawned engine needs a moment before it listens, so startup
    /// retries with delays of 100ms, 200ms, 400ms, etc. Only connection
    /// failures are retried.
    ///
    /// # Errors
    ///
    /// Returns the last connection error if all attempts fail.
    pub fn connect_with_retry(
        address: &str,
        kind: TransportKind,
        protocol: WireProtocol,
        max_attempts: u32,
    ) -> Result<Self, IpcError> {
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match Self::connect(address, kind, protocol) {
                Ok(client) => return Ok(client),
                Err(e @ IpcError::ConnectionFailed { .. }) => {
                    debug!("Connection attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last_error = Some(e);
                    if attempt < max_attempts {
                        // Exponential backoff: 100ms, 200ms, 400ms, ...
                        let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(6)));
                        thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| IpcError::ConnectionFailed {
            address: address.to_string(),
            reason: "No connection attempts were made".to_string(),
        }))
    }

    /// Set the request timeout duration.
    ///
    /// Default is 30 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn protocol(&self) -> WireProtocol {
        self.protocol
    }

    /// Send operand text or a command name and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Request times out (`IpcError::Timeout`)
    /// - The engine hangs up (`IpcError::Closed`)
    /// - The socket library reports a failure (`IpcError::Nng`, `IpcError::Zmq`)
    pub fn request(&mut self, text: &str) -> Result<Reply, IpcError> {
        let deadline = self.timeout;
        self.request_with_timeout(text, deadline)
    }

    /// Like `request`, with an explicit timeout for this exchange only.
    pub fn request_with_timeout(&mut self, text: &str, deadline: Duration) -> Result<Reply, IpcError> {
        let body = self.protocol.encode(text)?;
        debug!("-> {:?} ({})", text, self.transport.kind());

        let body = self.transport.request(&body, deadline)?;

        let quit = self.protocol.is_quit(&body);
        debug!("<- {} bytes{}", body.len(), if quit { " (quit)" } else { "" });

        Ok(Reply { body, quit })
    }
}
