//! rpn-term library
//!
//! Keystroke-driven front-end for a remote RPN calculation engine:
//!
//! - `tokenizer` - character-level state machine turning keystrokes into tokens
//! - `commands` - operator keys, command names and trigger resolution
//! - `ipc` - request-reply client for the engine (ZeroMQ or nng REQ socket)
//! - `backend` - blocking engine access used by the interactive loop
//! - `session` - the interactive loop
//! - `supervisor` - engine child process ownership
//! - `terminal` - raw mode guard, key input, signal handling
//! - `config` - command line and environment configuration
//!
//! # Example
//!
//! ```ignore
//! use rpn_term::backend::BackendClient;
//! use rpn_term::ipc::{EngineClient, TransportKind, WireProtocol};
//! use rpn_term::session::Session;
//! use rpn_term::tokenizer::ReaderInput;
//!
//! let client = EngineClient::connect(
//!     "127.0.0.1:33242",
//!     TransportKind::Zmtp,
//!     WireProtocol::Raw,
//! )?;
//! let backend = BackendClient::new(client);
//! let mut session = Session::new(ReaderInput::new(std::io::stdin()), backend, std::io::stdout());
//! session.run()?;
//! ```

pub mod backend;
pub mod commands;
pub mod config;
pub mod ipc;
pub mod session;
pub mod supervisor;
pub mod terminal;
pub mod tokenizer;
