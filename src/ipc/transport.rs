//! Transport selection: an nng REQ0 socket (SP) or a libzmq REQ socket (ZMTP).
//!
//! Both sockets are blocking. Every exchange sets the socket's own send and
//! receive timeouts, so a silent engine surfaces as `IpcError::Timeout`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use nng::options::{Options, RecvTimeout, SendTimeout};
use tracing::debug;

use super::client::IpcError;

/// Which messaging library the engine's REP socket is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// nng scalability protocols (REQ0/REP0).
    Sp,
    /// ZeroMQ (libzmq REQ/REP).
    #[default]
    Zmtp,
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Sp => "sp",
            TransportKind::Zmtp => "zmtp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sp" | "nng" => Ok(TransportKind::Sp),
            "zmtp" | "zmq" => Ok(TransportKind::Zmtp),
            other => Err(format!(
                "Unknown transport '{}' (expected sp or zmtp)",
                other
            )),
        }
    }
}

/// Turn a `host:port` address into a socket endpoint URL.
pub fn endpoint(address: &str) -> String {
    format!("tcp://{}", address)
}

/// A connected REQ socket of either kind.
pub enum Transport {
    Sp(nng::Socket),
    Zmtp(ZmqReq),
}

/// libzmq REQ socket together with the context that owns it.
///
/// Fields drop in order, so the socket is closed before the context is
/// terminated.
pub struct ZmqReq {
    socket: zmq::Socket,
    _context: zmq::Context,
}

impl Transport {
    /// Open a REQ socket of `kind` and connect it to `address` (`host:port`).
    ///
    /// nng dials synchronously, so a refused connection fails here. libzmq
    /// connects in the background; with `ZMQ_IMMEDIATE` set, the first send
    /// waits (up to `timeout`) for the engine to accept.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionFailed` if the engine cannot be reached.
    pub fn connect(kind: TransportKind, address: &str, timeout: Duration) -> Result<Self, IpcError> {
        let url = endpoint(address);
        let failed = |reason: String| IpcError::ConnectionFailed {
            address: url.clone(),
            reason,
        };

        match kind {
            TransportKind::Sp => {
                let socket = nng::Socket::new(nng::Protocol::Req0).map_err(IpcError::Nng)?;
                socket
                    .set_opt::<SendTimeout>(Some(timeout))
                    .map_err(IpcError::Nng)?;
                socket.dial(&url).map_err(|e| failed(e.to_string()))?;
                debug!("nng REQ0 socket dialed {}", url);
                Ok(Transport::Sp(socket))
            }
            TransportKind::Zmtp => {
                let context = zmq::Context::new();
                let socket = context.socket(zmq::REQ).map_err(IpcError::Zmq)?;
                // Never block process exit on unsent requests
                socket.set_linger(0).map_err(IpcError::Zmq)?;
                socket.set_immediate(true).map_err(IpcError::Zmq)?;
                socket.connect(&url).map_err(|e| failed(e.to_string()))?;
                debug!("ZeroMQ REQ socket connecting to {}", url);
                Ok(Transport::Zmtp(ZmqReq {
                    socket,
                    _context: context,
                }))
            }
        }
    }

    /// Send one request body and wait up to `timeout` for the reply body.
    ///
    /// Multi-part ZeroMQ replies are joined into one body.
    pub fn request(&mut self, body: &[u8], timeout: Duration) -> Result<Vec<u8>, IpcError> {
        match self {
            Transport::Sp(socket) => {
                socket
                    .set_opt::<RecvTimeout>(Some(timeout))
                    .map_err(IpcError::Nng)?;
                socket
                    .send(body)
                    .map_err(|(_, e)| nng_error(e, timeout))?;
                let reply = socket.recv().map_err(|e| nng_error(e, timeout))?;
                Ok(reply.as_slice().to_vec())
            }
            Transport::Zmtp(req) => {
                let millis = zmq_millis(timeout);
                req.socket.set_sndtimeo(millis).map_err(IpcError::Zmq)?;
                req.socket.set_rcvtimeo(millis).map_err(IpcError::Zmq)?;
                req.socket
                    .send(body, 0)
                    .map_err(|e| zmq_error(e, timeout))?;
                let parts = req
                    .socket
                    .recv_multipart(0)
                    .map_err(|e| zmq_error(e, timeout))?;
                Ok(parts.concat())
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Sp(_) => TransportKind::Sp,
            Transport::Zmtp(_) => TransportKind::Zmtp,
        }
    }
}

/// Classify an nng failure during an exchange.
pub(crate) fn nng_error(err: nng::Error, timeout: Duration) -> IpcError {
    match err {
        nng::Error::TimedOut => IpcError::Timeout(timeout),
        nng::Error::Closed
        | nng::Error::ConnectionReset
        | nng::Error::ConnectionAborted
        | nng::Error::ConnectionShutdown => IpcError::Closed,
        other => IpcError::Nng(other),
    }
}

/// Classify a libzmq failure during an exchange.
pub(crate) fn zmq_error(err: zmq::Error, timeout: Duration) -> IpcError {
    match err {
        zmq::Error::EAGAIN => IpcError::Timeout(timeout),
        zmq::Error::ETERM => IpcError::Closed,
        other => IpcError::Zmq(other),
    }
}

/// libzmq takes timeouts as signed milliseconds.
fn zmq_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}
