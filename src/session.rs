//! The interactive loop.
//!
//! Each pass reads one token, sends its operand (if any), resolves its
//! trigger and sends the resulting command (unless it is a no-op), printing
//! every reply as it arrives. The loop ends when the engine signals quit or
//! the input is interrupted or closed.

use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::commands::{resolve, Resolution, COMMANDS, DELIMITERS};
use crate::ipc::{IpcError, Reply};
use crate::tokenizer::{read_token, CharSource, InputError};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The engine acknowledged `quit` (or hung up after it).
    EngineQuit,
    /// Ctrl-C or a termination signal.
    Interrupted,
    /// End of input.
    InputClosed,
}

/// Errors that abort the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A round trip to the engine failed mid-session.
    #[error("Engine request failed: {0}")]
    Backend(#[from] IpcError),

    /// Reading keys or writing output failed.
    #[error("Terminal I/O error: {0}")]
    Terminal(#[source] io::Error),
}

/// Counters for one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Tokens read from the input.
    pub tokens: u64,
    /// Requests sent to the engine.
    pub requests: u64,
    /// Tokens whose trigger resolved to nothing.
    pub noops: u64,
}

/// One interactive session over an input, an engine and an output.
pub struct Session<I, B, W> {
    input: I,
    backend: B,
    output: W,
    stats: SessionStats,
}

impl<I, B, W> Session<I, B, W>
where
    I: CharSource,
    B: Backend,
    W: Write,
{
    pub fn new(input: I, backend: B, output: W) -> Self {
        Self {
            input,
            backend,
            output,
            stats: SessionStats::default(),
        }
    }

    /// Process tokens until the session ends.
    ///
    /// # Errors
    ///
    /// Any failed round trip ends the session with `SessionError::Backend`;
    /// nothing is retried.
    pub fn run(&mut self) -> Result<ExitReason, SessionError> {
        info!("Session started");
        loop {
            if let Some(reason) = self.step()? {
                info!(
                    "Session ended ({:?}): {} tokens, {} requests",
                    reason, self.stats.tokens, self.stats.requests
                );
                return Ok(reason);
            }
        }
    }

    /// Read and dispatch a single token.
    ///
    /// Returns `Some` when the session is over.
    pub fn step(&mut self) -> Result<Option<ExitReason>, SessionError> {
        let token = match read_token(&mut self.input, &mut self.output, DELIMITERS, COMMANDS) {
            Ok(token) => token,
            Err(InputError::Interrupted) => return Ok(Some(ExitReason::Interrupted)),
            Err(InputError::Closed) => return Ok(Some(ExitReason::InputClosed)),
            Err(InputError::Io(e)) => return Err(SessionError::Terminal(e)),
        };
        self.stats.tokens += 1;
        debug!("Token: operand={:?} trigger={}", token.operand, token.trigger);

        let operand_was_empty = token.operand.is_empty();
        if !operand_was_empty {
            let reply = self.backend.send_operand(&token.operand)?;
            self.stats.requests += 1;
            self.print(&reply)?;
        }

        match resolve(&token.trigger, operand_was_empty) {
            Resolution::NoOp => {
                self.stats.noops += 1;
                Ok(None)
            }
            Resolution::Command(name) => {
                let reply = self.backend.send_command(&name)?;
                self.stats.requests += 1;
                self.print(&reply)?;
                Ok(reply.quit.then_some(ExitReason::EngineQuit))
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    fn print(&mut self, reply: &Reply) -> Result<(), SessionError> {
        // A hangup after quit has nothing to show
        if reply.body.is_empty() && reply.quit {
            return Ok(());
        }
        writeln!(self.output, "{}", reply.text()).map_err(SessionError::Terminal)?;
        self.output.flush().map_err(SessionError::Terminal)
    }
}
