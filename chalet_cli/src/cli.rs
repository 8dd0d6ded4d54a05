//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "chalet", version, about = "Chalet battery and water monitor")]
pub struct Cli {
    /// Path to config TOML; defaults are used if it does not exist
    #[arg(long, value_name = "FILE", default_value = "etc/chalet.toml")]
    pub config: PathBuf,

    /// Override the record directory from the config
    #[arg(long, value_name = "DIR")]
    pub records: Option<PathBuf>,

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

/// Telemetry record layouts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FrameKind {
    Battery,
    Tank,
    Calibration,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sampling loop until interrupted
    Monitor {
        /// Stop after this many ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Use simulated amplifiers and flow meters even in hardware builds
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Simulated counts on the load-side shunt
        #[arg(long, value_name = "COUNTS", default_value_t = -710, allow_hyphen_values = true)]
        chalet_counts: i16,
        /// Simulated counts on the charger-side shunt
        #[arg(long, value_name = "COUNTS", default_value_t = 0, allow_hyphen_values = true)]
        ctek_counts: i16,
        /// Simulated fill meter pulse rate
        #[arg(long, value_name = "HZ", default_value_t = 0)]
        fill_hz: u32,
        /// Simulated drain meter pulse rate
        #[arg(long, value_name = "HZ", default_value_t = 0)]
        drain_hz: u32,
        /// Print a hex telemetry frame per entity each tick
        #[arg(long, action = ArgAction::SetTrue)]
        telemetry: bool,
    },
    /// Print the persisted records
    Show,
    /// Decode a hex telemetry frame
    Decode {
        #[arg(long, value_enum)]
        kind: FrameKind,
        /// Frame bytes as hex, method tag first
        frame: String,
    },
}
