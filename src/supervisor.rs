//! Engine process supervision.
//!
//! The engine runs as a child process next to the interactive loop. Its
//! standard streams are detached so nothing it prints lands on the prompt.
//!
//! # Process Cleanup Safety
//! `EngineSupervisor` owns the child. `shutdown()` is called on the loop's
//! exit path; if it is skipped (early return, panic unwinding), `Drop` runs
//! the same shutdown so the engine never outlives the front-end.

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// How long the engine gets to exit on its own before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owned handle to the running engine process.
pub struct EngineSupervisor {
    child: Option<Child>,
}

impl EngineSupervisor {
    /// Launch the engine with its standard streams discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable cannot be spawned. The front-end
    /// cannot do anything useful without an engine, so callers treat this as
    /// fatal.
    pub fn start(program: &Path, args: &[String]) -> Result<Self> {
        info!("Starting engine: {} {:?}", program.display(), args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn engine process {}", program.display()))?;

        info!("Engine running with pid {}", child.id());

        Ok(Self { child: Some(child) })
    }

    /// Process id of the engine, if it has not been shut down.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Exit status if the engine has already stopped.
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child
                .try_wait()
                .context("Failed to query engine process status"),
            None => Ok(None),
        }
    }

    /// True while the child we launched is still running.
    ///
    /// An engine that could not bind its address exits early, and whatever
    /// answered on that address belongs to someone else.
    pub fn is_running(&mut self) -> bool {
        match self.try_status() {
            Ok(None) => self.child.is_some(),
            Ok(Some(status)) => {
                debug!("Engine already exited with {}", status);
                false
            }
            Err(e) => {
                warn!("{:#}", e);
                false
            }
        }
    }

    /// Stop the engine and reap it.
    ///
    /// Waits up to `grace` for the engine to exit by itself (after a `quit`
    /// it usually already has), then kills it. Returns `None` if the engine
    /// was already shut down.
    pub fn shutdown(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };

        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Engine exited with {}", status);
                    return Ok(Some(status));
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => break,
                Err(e) => {
                    warn!("Error waiting for engine: {}", e);
                    break;
                }
            }
        }

        warn!("Engine didn't exit within {:?}, killing", grace);
        // kill() fails if the process exited in the meantime; wait() still reaps it
        let _ = child.kill();
        let status = child.wait().context("Failed to reap engine process")?;
        Ok(Some(status))
    }
}

impl Drop for EngineSupervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.shutdown(DEFAULT_SHUTDOWN_GRACE) {
                warn!("Engine cleanup failed: {}", e);
            }
        }
    }
}
