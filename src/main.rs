//! rpn-term - keystroke-driven terminal front-end for an RPN engine.
//!
//! This is the main entry point. It launches the engine, connects to it,
//! puts the terminal into raw mode and runs the interactive loop, then shuts
//! everything down in reverse order. The tokio runtime only drives the
//! signal watcher; engine round trips block on the socket.

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rpn_term::backend::{Backend, BackendClient};
use rpn_term::commands::QUIT_COMMAND;
use rpn_term::config::{Cli, Config};
use rpn_term::ipc::EngineClient;
use rpn_term::session::{ExitReason, Session};
use rpn_term::supervisor::{EngineSupervisor, DEFAULT_SHUTDOWN_GRACE};
use rpn_term::terminal::{
    install_panic_hook, watch_shutdown_signals, CrosstermInput, Interruptible, RawModeWriter,
    TerminalGuard,
};
use rpn_term::tokenizer::{CharSource, ReaderInput};

/// Send log output to `path`; stdout and stderr belong to the prompt.
///
/// If the file cannot be opened, logging stays off.
fn init_logging(path: &Path) {
    let file = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(path));

    let file = match file {
        Ok(file) => file,
        Err(_) => return,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rpn_term=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
}

fn main() -> Result<()> {
    // Install panic hook FIRST for terminal safety
    install_panic_hook();

    let config = Config::try_from(Cli::parse())?;
    init_logging(&config.log_file);

    info!("Starting rpn-term v{}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let mut engine = match &config.engine {
        Some(launch) => Some(EngineSupervisor::start(&launch.program, &launch.args)?),
        None => None,
    };

    let result = connect_and_run(&runtime, &config, engine.as_mut());

    // Stop the engine after the connection is gone
    if let Some(engine) = engine.as_mut() {
        match engine.shutdown(DEFAULT_SHUTDOWN_GRACE) {
            Ok(Some(status)) => info!("Engine stopped: {}", status),
            Ok(None) => {}
            Err(e) => warn!("Engine shutdown failed: {:#}", e),
        }
    }

    match result {
        Ok(reason) => {
            info!("rpn-term exited cleanly ({:?})", reason);
            Ok(())
        }
        Err(e) => {
            error!("Application error: {:#}", e);
            Err(e)
        }
    }
}

/// Connect to the engine and run a session on whichever input is attached.
fn connect_and_run(
    runtime: &Runtime,
    config: &Config,
    engine: Option<&mut EngineSupervisor>,
) -> Result<ExitReason> {
    let mut client = EngineClient::connect_with_retry(
        &config.address,
        config.transport,
        config.protocol,
        config.connect_attempts,
    )
    .with_context(|| format!("Could not reach the engine at {}", config.address))?;
    client.set_timeout(config.timeout);

    let backend = BackendClient::new(client);

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = watch_shutdown_signals(runtime.handle(), Arc::clone(&shutdown)) {
        warn!("Signal handling unavailable: {}", e);
    }

    if io::stdin().is_terminal() {
        // Setup terminal with RAII guard - ensures cleanup on any exit path
        let guard = TerminalGuard::new().context("Failed to enable raw terminal mode")?;
        let result = run_session(
            CrosstermInput::new(shutdown),
            RawModeWriter::new(io::stdout()),
            backend,
            engine,
        );
        drop(guard);

        if matches!(result, Ok(ExitReason::Interrupted)) {
            // Leave the prompt on a fresh line
            println!();
        }
        result
    } else {
        run_session(
            Interruptible::new(ReaderInput::new(io::stdin().lock()), shutdown),
            io::stdout(),
            backend,
            engine,
        )
    }
}

/// Run the interactive loop, then ask an engine we launched to quit.
fn run_session<I, W>(
    input: I,
    output: W,
    backend: BackendClient,
    engine: Option<&mut EngineSupervisor>,
) -> Result<ExitReason>
where
    I: CharSource,
    W: Write,
{
    let mut session = Session::new(input, backend, output);
    let reason = session.run()?;

    let stats = session.stats();
    debug!(
        "Session stats: {} tokens, {} requests, {} no-ops",
        stats.tokens, stats.requests, stats.noops
    );

    if reason == ExitReason::EngineQuit {
        return Ok(reason);
    }

    if let Some(engine) = engine {
        if engine.is_running() {
            info!("Asking engine to quit ({:?})", reason);
            if let Err(e) = session.backend_mut().send_command(QUIT_COMMAND) {
                debug!("Engine did not acknowledge quit: {}", e);
            }
        } else {
            warn!("Launched engine is not running; leaving the connected engine alone");
        }
    }

    Ok(reason)
}
