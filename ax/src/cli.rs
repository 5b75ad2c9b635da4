//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// AnchorSync - distributed spatial-anchor synchronization
#[derive(Parser)]
#[command(
    name = "anchorsync",
    about = "Spatial-anchor synchronization daemon and loopback tools",
    after_help = "Logs are written to: ~/.local/share/anchorsync/logs/anchorsync.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run a loopback session: N simulated participants share one anchor
    Run {
        /// Number of participants
        #[arg(short, long, default_value = "2")]
        peers: usize,

        /// Seconds to wait for every participant to reach Ready
        #[arg(short, long, default_value = "15")]
        timeout: u64,
    },

    /// Show the effective configuration and cache summary
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Inspect or clear the local anchor cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Cache subcommands
#[derive(Subcommand)]
pub enum CacheCommand {
    /// List cached anchors
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove every cached anchor
    Clear,
}

/// Output format for machine-readable commands
#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
