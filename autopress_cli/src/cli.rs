//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "autopress", version, about = "Pressure-gated oscilloscope trigger")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Optional gauge calibration CSV (strict header: voltage,pressure_mbar)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log and print results as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Run-time overrides for values that otherwise come from the config file.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Target pressure in mbar; repeat for several targets
    #[arg(long, value_name = "MBAR")]
    pub setpoint: Vec<f64>,
    /// Band half-width as a percentage of the setpoint
    #[arg(long = "tolerance-pct", value_name = "PCT")]
    pub tolerance_pct: Option<f64>,
    /// Sampling interval in milliseconds
    #[arg(long = "interval-ms", value_name = "MS")]
    pub interval_ms: Option<u64>,
    /// ADC channel (1..=8)
    #[arg(long, value_name = "N")]
    pub channel: Option<u8>,
    /// Oscilloscope host or IP (optionally host:port)
    #[arg(long, value_name = "HOST")]
    pub address: Option<String>,
    /// Particle number used in saved file names
    #[arg(long, value_name = "N")]
    pub particle: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the trigger loop until Ctrl-C
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// Stop after this many cycles
        #[arg(long = "max-cycles", value_name = "N")]
        max_cycles: Option<u64>,
    },
    /// Print voltage and pressure readings
    Read {
        /// Number of samples to take
        #[arg(long, default_value_t = 5)]
        samples: u32,
        /// ADC channel (1..=8)
        #[arg(long, value_name = "N")]
        channel: Option<u8>,
    },
    /// Connect to the instrument and print its identification
    Check {
        /// Oscilloscope host or IP (optionally host:port)
        #[arg(long, value_name = "HOST")]
        address: Option<String>,
    },
    /// Quick health check (config and sensor)
    SelfCheck,
}
