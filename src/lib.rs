//! stickyconf - keeps a block of configuration overrides merged into a file
//! that another service owns and may rewrite at any time.
//!
//! The library holds the reconciliation engine and the pieces around it; the
//! `stickyconf` binary wires them into a daemon (`run`) and a single-pass
//! entry point (`once`).

pub mod action_log;
pub mod backup;
pub mod block;
pub mod checksum;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod debounce;
pub mod reconcile;
pub mod reload;
pub mod scheduler;
pub mod store;
pub mod sys;
pub mod watcher;

use std::path::PathBuf;


/// Library-level error type for stickyconf operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("KDL error: {0}")]
    Kdl(#[from] kdl::KdlError),

    /// The target file or the override source is absent or unreadable.
    #[error("required file missing or unreadable: {}: {source}", path.display())]
    ConfigMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the reconciled target failed; nothing after the write ran.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pre-mutation snapshot could not be taken; the target was not touched.
    #[error("failed to back up {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state store error: {0}")]
    State(String),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for stickyconf operations.
pub type Result<T> = std::result::Result<T, Error>;
