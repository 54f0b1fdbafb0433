//! IPC client for communication with the calculation engine.
//!
//! The engine runs as a separate process and answers one request at a time
//! over a loopback TCP connection:
//!
//! ```text
//! ┌─────────────────┐          TCP (loopback)          ┌─────────────────┐
//! │   rpn-term      │  ◄─────────────────────────────► │     engine      │
//! │ (EngineClient)  │   REQ/REP, one request in flight │   (REP socket)  │
//! └─────────────────┘                                  └─────────────────┘
//! ```
//!
//! # Layers
//!
//! - **Transport** (`TransportKind`): the messaging library. `zmtp` is a
//!   libzmq REQ socket, `sp` is an nng REQ0 socket.
//! - **Protocol** (`WireProtocol`): payload encoding. `raw` sends bare text,
//!   `json` wraps each request in a `request_type`/`payload` envelope.
//!
//! Both are chosen by configuration when the connection is opened.
//!
//! # Usage
//!
//! ```ignore
//! use rpn_term::ipc::{EngineClient, TransportKind, WireProtocol};
//!
//! let mut client = EngineClient::connect_with_retry(
//!     "127.0.0.1:33242",
//!     TransportKind::Zmtp,
//!     WireProtocol::Raw,
//!     8,
//! )?;
//! let reply = client.request("sqrt")?;
//! ```

mod client;
mod protocol;
mod transport;

pub use client::{EngineClient, IpcError, Reply, DEFAULT_ADDRESS, DEFAULT_TIMEOUT_SECS};
pub use protocol::WireProtocol;
pub use transport::{endpoint, Transport, TransportKind};
