//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "dockd", version, about = "Gas detector docking station daemon")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dock_config.toml")]
    pub config: PathBuf,

    /// Optional factory cylinder catalog CSV (strict header)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the station services and the heartbeat loop until Ctrl-C
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long, value_name = "SECS")]
        seconds: Option<u64>,
        /// Interval between idle heartbeats
        #[arg(long, value_name = "MS", default_value_t = 5_000)]
        heartbeat_ms: u64,
    },
    /// Sample every switch once and report what the hardware sees
    SelfCheck,
    /// Print the station health snapshot as JSON
    Health,
    /// List the payloads waiting in the upload queue
    Queue,
}
