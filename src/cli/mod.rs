//! CLI argument definitions for stickyconf.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Version string shown by `--version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("STICKYCONF_GIT_COMMIT"),
    ", built ",
    env!("STICKYCONF_BUILD_TIMESTAMP"),
    ")"
);

/// stickyconf - keep configuration overrides merged into a file another
/// service owns.
///
/// Run `stickyconf run` under a process supervisor, or `stickyconf once`
/// from a periodic scheduler.
#[derive(Parser, Debug)]
#[command(name = "stickyconf")]
#[command(author, version, long_version = LONG_VERSION, about = "Keep configuration overrides merged into an externally managed file", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Path to config.kdl (default: ~/.config/stickyconf/config.kdl)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// File to maintain (the owning service's configuration file)
    #[arg(long, global = true)]
    pub target: Option<PathBuf>,

    /// File holding the override directives
    #[arg(long, global = true)]
    pub overrides: Option<PathBuf>,

    /// systemd unit to reload after the target is rewritten
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run continuously: converge on startup, then on every change and interval
    Run,

    /// Run a single reconciliation pass and exit
    Once,

    /// Show what the next pass would do, without changing anything
    Status,

    /// Backup management commands
    Backups {
        #[command(subcommand)]
        command: BackupsCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Backup subcommands
#[derive(Subcommand, Debug)]
pub enum BackupsCommands {
    /// List snapshots of the target, newest first
    List,

    /// Delete snapshots older than the retention window
    Prune,

    /// Delete every snapshot of the target
    Purge,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show every resolved setting and where it came from
    Show,

    /// Write a starter config.kdl
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
