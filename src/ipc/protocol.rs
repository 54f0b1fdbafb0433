//! Payload encodings spoken over the transport.
//!
//! Two encodings exist in the engine ecosystem:
//!
//! - `raw`: each request body is the operand text or command name itself, and
//!   the reply is plain text. Engines of this kind stop answering when they
//!   receive `quit`.
//! - `json`: each request is wrapped in an envelope,
//!   `{"request_type":"input","payload":"<text>"}`, and each reply is an object
//!   with a `response_type` of `stack`, `error`, `commands` or `quitsig`.
//!
//! The encoding is chosen explicitly at connection time; there is no sniffing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::client::IpcError;

/// The payload encoding used for every request on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireProtocol {
    /// Bare UTF-8 text in both directions.
    #[default]
    Raw,
    /// JSON request envelopes and JSON replies.
    Json,
}

/// Request envelope for the JSON encoding.
#[derive(Serialize, Debug)]
struct ClientRequest<'a> {
    request_type: RequestType,
    payload: &'a str,
}

#[derive(Serialize, Debug)]
enum RequestType {
    #[serde(rename = "input")]
    Input,
}

/// The part of a JSON reply this client inspects.
#[derive(Deserialize, Debug)]
struct ServerResponse {
    response_type: ResponseType,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ResponseType {
    Stack,
    Error,
    Commands,
    QuitSig,
    #[serde(other)]
    Unknown,
}

impl WireProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            WireProtocol::Raw => "raw",
            WireProtocol::Json => "json",
        }
    }

    /// Encode operand text or a command name as a request body.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, IpcError> {
        match self {
            WireProtocol::Raw => Ok(text.as_bytes().to_vec()),
            WireProtocol::Json => {
                let request = ClientRequest {
                    request_type: RequestType::Input,
                    payload: text,
                };
                serde_json::to_vec(&request)
                    .map_err(|e| IpcError::Protocol(format!("Failed to serialize request: {}", e)))
            }
        }
    }

    /// Returns true if `reply` tells the client the engine is shutting down.
    ///
    /// The raw encoding has no quit signal; those engines stop answering instead.
    pub fn is_quit(&self, reply: &[u8]) -> bool {
        match self {
            WireProtocol::Raw => false,
            WireProtocol::Json => serde_json::from_slice::<ServerResponse>(reply)
                .map(|response| response.response_type == ResponseType::QuitSig)
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "text" => Ok(WireProtocol::Raw),
            "json" => Ok(WireProtocol::Json),
            other => Err(format!(
                "Unknown wire protocol '{}' (expected raw or json)",
                other
            )),
        }
    }
}
