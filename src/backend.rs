//! Blocking engine access for the interactive loop.
//!
//! The loop is synchronous: it blocks on a keystroke, then on a round trip.
//! `BackendClient` forwards each call to the `EngineClient`, whose REQ socket
//! blocks with its own send and receive timeouts.

use std::time::Duration;

use tracing::{debug, info};

use crate::commands::QUIT_COMMAND;
use crate::ipc::{EngineClient, IpcError, Reply, WireProtocol};

/// How long to wait for the engine to answer `quit` before assuming it left.
pub const DEFAULT_QUIT_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Service Trait for Dependency Injection
// =============================================================================

/// Trait for engine round trips.
///
/// This trait abstracts the engine connection to enable:
/// - Dependency injection for testing with mock implementations
/// - Separation of the input loop from the transport
pub trait Backend {
    /// Push operand text onto the engine's stack. Never called with "".
    fn send_operand(&mut self, text: &str) -> Result<Reply, IpcError>;

    /// Run a canonical command.
    fn send_command(&mut self, name: &str) -> Result<Reply, IpcError>;
}

/// `Backend` over a live engine connection.
pub struct BackendClient {
    client: EngineClient,
    quit_timeout: Duration,
}

impl BackendClient {
    pub fn new(client: EngineClient) -> Self {
        Self {
            client,
            quit_timeout: DEFAULT_QUIT_TIMEOUT,
        }
    }

    pub fn set_quit_timeout(&mut self, timeout: Duration) {
        self.quit_timeout = timeout;
    }

    /// Send `quit` and interpret the outcome.
    ///
    /// Raw engines have no quit signal, so any answer to `quit` ends the
    /// session. An engine that hangs up or goes silent has quit as well.
    fn send_quit(&mut self) -> Result<Reply, IpcError> {
        let protocol = self.client.protocol();
        let result = self
            .client
            .request_with_timeout(QUIT_COMMAND, self.quit_timeout);

        match result {
            Ok(mut reply) => {
                if protocol == WireProtocol::Raw {
                    reply.quit = true;
                }
                Ok(reply)
            }
            Err(e) if e.is_disconnect() => {
                info!("Engine stopped after quit ({})", e);
                Ok(Reply::hangup())
            }
            Err(e) => Err(e),
        }
    }
}

impl Backend for BackendClient {
    fn send_operand(&mut self, text: &str) -> Result<Reply, IpcError> {
        debug!("Sending operand {:?}", text);
        self.client.request(text)
    }

    fn send_command(&mut self, name: &str) -> Result<Reply, IpcError> {
        if name == QUIT_COMMAND {
            return self.send_quit();
        }
        debug!("Sending command {}", name);
        self.client.request(name)
    }
}
