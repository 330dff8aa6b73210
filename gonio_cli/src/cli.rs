//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "gonio", version, about = "Kappa goniometer CLI (simulated stage)")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines (logs, results and errors) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print native and spherical coordinates of the stage
    Where,
    /// Move in spherical coordinates; unspecified coordinates are held
    Mv {
        /// Target e_eta in degrees
        #[arg(long = "e-eta", value_name = "DEG", allow_negative_numbers = true)]
        e_eta: Option<f64>,
        /// Target e_chi in degrees
        #[arg(long = "e-chi", value_name = "DEG", allow_negative_numbers = true)]
        e_chi: Option<f64>,
        /// Target e_phi in degrees
        #[arg(long = "e-phi", value_name = "DEG", allow_negative_numbers = true)]
        e_phi: Option<f64>,
        /// Approve large steps without prompting
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Show forward/inverse unit conversion of a value
    Convert {
        /// Value to convert (derived units for forward, original for inverse)
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
        /// Override the configured offset (derived units)
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<f64>,
        /// Also write the value through the signal (needs a writable `[units] io`)
        #[arg(long, action = ArgAction::SetTrue)]
        write: bool,
    },
    /// Feed samples 1..=N through a rolling average and print the mean
    Average {
        /// Number of samples to feed
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        samples: u32,
    },
    /// Validate configuration and round-trip the transform
    SelfCheck,
}
