//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Host-side capture/analysis pipeline: one binary, one subcommand per
/// long-lived service.
#[derive(Debug, Parser)]
#[command(name = "hostpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but warning/error logs.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Path to a TOML config file (defaults to the platform config dir).
    #[arg(long, global = true, env = "HOSTPIPE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands. Each long-lived service maps to one subcommand;
/// `Config`/`Registry` additionally expose management actions.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the frame monitor: inotify-driven detection and incident hookup.
    Monitor,
    /// Run the hot/cold archiver cycle.
    Archiver {
        /// Run a single cycle and exit instead of looping forever.
        #[arg(long)]
        once: bool,
        /// Emit the cycle report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Run the KPI executor, draining `/tmp/kpi_queue/`.
    Kpi,
    /// Run the transcript accumulator.
    Transcript,
    /// Manually trigger zap detection for one frame (testing aid).
    Zap {
        /// Device capture folder, e.g. `capture1`.
        #[arg(long)]
        capture_folder: String,
        /// Frame filename within the captures directory.
        #[arg(long)]
        frame_filename: String,
        /// Measured blackscreen duration in milliseconds.
        #[arg(long)]
        blackscreen_duration_ms: u64,
    },
    /// Manage the server-side host registry.
    Registry {
        /// Registry action to perform.
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Registry subcommand actions.
#[derive(Debug, Subcommand)]
pub enum RegistryAction {
    /// Serve the registry's minimal HTTP surface (register/ping/unregister/
    /// `getAllHosts`/health).
    Serve {
        /// Address to bind to, overriding the configured default.
        #[arg(long)]
        bind_addr: Option<String>,
    },
    /// List currently registered hosts.
    ListHosts,
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}
