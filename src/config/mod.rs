//! Configuration for stickyconf.
//!
//! ## config.kdl
//!
//! Located at `~/.config/stickyconf/config.kdl` unless `--config` or
//! `STICKYCONF_CONFIG` points elsewhere. Relative paths inside it are
//! resolved against the file's own directory.
//!
//! Contains:
//! - `target` / `overrides` - the maintained file and the override source
//! - `service` - systemd unit to reload after a rewrite
//! - `state-dir`, `backup-dir`, `log-file` - where stickyconf keeps its own files
//! - `start-marker`, `end-marker`, `comment-prefix`, `placement` - block layout
//! - `debounce-secs`, `fallback-interval-secs`, `backup-retention-days`,
//!   `log-max-lines`, `log-keep-lines`, `reload-timeout-secs` - tuning
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_ENV, ConfigOverrides, DATA_DIR_ENV, OVERRIDES_ENV, Resolved, ResolvedConfig,
    SERVICE_ENV, TARGET_ENV, ValueSource, default_config_path, locate_config, process_env,
    resolve_config, resolve_config_with_env,
};
pub use schema::StickyConfig;

/// Permissions for a config.kdl written by `stickyconf config init`.
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;
