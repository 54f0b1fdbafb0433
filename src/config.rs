//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::ipc::{TransportKind, WireProtocol, DEFAULT_ADDRESS, DEFAULT_TIMEOUT_SECS};

/// Engine executable launched unless `--engine` says otherwise.
pub const DEFAULT_ENGINE_PATH: &str = "target/debug/rpn-engine";

#[derive(Parser, Debug)]
#[clap(
    name = "rpn-term",
    version,
    about = "Keystroke-driven RPN calculator front-end for a remote engine"
)]
pub struct Cli {
    #[clap(
        long,
        env = "RPN_ADDRESS",
        default_value = DEFAULT_ADDRESS,
        help = "Engine address (host:port, tcp:// prefix allowed)"
    )]
    pub address: String,

    #[clap(
        long,
        env = "RPN_TRANSPORT",
        default_value = "zmtp",
        help = "Engine socket library: zmtp (ZeroMQ) or sp (nng)"
    )]
    pub transport: TransportKind,

    #[clap(
        long,
        env = "RPN_PROTOCOL",
        default_value = "raw",
        help = "Payload encoding: raw text or json envelopes"
    )]
    pub protocol: WireProtocol,

    #[clap(
        long,
        env = "RPN_ENGINE",
        default_value = DEFAULT_ENGINE_PATH,
        help = "Engine executable to launch"
    )]
    pub engine: PathBuf,

    #[clap(
        long = "engine-arg",
        allow_hyphen_values = true,
        help = "Argument passed to the engine (repeatable)"
    )]
    pub engine_args: Vec<String>,

    #[clap(long, help = "Connect to an already running engine instead of launching one")]
    pub no_spawn: bool,

    #[clap(
        long,
        env = "RPN_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Seconds to wait for each engine reply"
    )]
    pub timeout_secs: u64,

    #[clap(long, default_value_t = 8, help = "Connection attempts before giving up")]
    pub connect_attempts: u32,

    #[clap(long, env = "RPN_LOG_FILE", help = "Log file (defaults to the user cache dir)")]
    pub log_file: Option<PathBuf>,
}

/// How to launch the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLaunch {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `host:port` to connect to.
    pub address: String,
    pub transport: TransportKind,
    pub protocol: WireProtocol,
    /// `None` when connecting to an engine someone else started.
    pub engine: Option<EngineLaunch>,
    pub timeout: Duration,
    pub connect_attempts: u32,
    pub log_file: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid engine address '{0}' (expected host:port)")]
    Address(String),

    #[error("--timeout-secs must be greater than zero")]
    ZeroTimeout,

    #[error("--connect-attempts must be greater than zero")]
    ZeroAttempts,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if cli.connect_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        let engine = (!cli.no_spawn).then(|| EngineLaunch {
            program: cli.engine,
            args: cli.engine_args,
        });

        Ok(Config {
            address: normalize_address(&cli.address)?,
            transport: cli.transport,
            protocol: cli.protocol,
            engine,
            timeout: Duration::from_secs(cli.timeout_secs),
            connect_attempts: cli.connect_attempts,
            log_file: cli.log_file.unwrap_or_else(default_log_path),
        })
    }
}

/// Turn an engine address into a connectable `host:port`.
///
/// Accepts the `tcp://` URLs engines print (including the `*` wildcard they
/// bind to, which maps to loopback).
pub fn normalize_address(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed.strip_prefix("tcp://").unwrap_or(trimmed);

    let (host, port) = without_scheme
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Address(raw.to_string()))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(ConfigError::Address(raw.to_string()));
    }

    let host = if host == "*" { "127.0.0.1" } else { host };
    Ok(format!("{}:{}", host, port))
}

/// Resolve the default log file location.
///
/// Resolution order:
/// 1. `<cache dir>/rpn-term/rpn-term.log` (XDG cache on Linux, Library/Caches on macOS)
/// 2. `<temp dir>/rpn-term/rpn-term.log` (fallback)
pub fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rpn-term")
        .join("rpn-term.log")
}
