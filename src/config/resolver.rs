//! Precedence resolution for stickyconf settings.
//!
//! ## Config file location (highest to lowest)
//!
//! 1. `--config` CLI flag
//! 2. `STICKYCONF_CONFIG` environment variable
//! 3. `~/.config/stickyconf/config.kdl`
//!
//! ## Values (highest to lowest)
//!
//! 1. CLI flags (`--target`, `--overrides`, `--service`)
//! 2. Environment variables (`STICKYCONF_TARGET`, `STICKYCONF_OVERRIDES`, `STICKYCONF_SERVICE`)
//! 3. config.kdl
//! 4. Built-in defaults
//!
//! Directories default to subdirectories of the data root: `STICKYCONF_DATA_DIR`
//! if set, otherwise `~/.local/share/stickyconf`.

use crate::action_log::{self, FileEventLog};
use crate::backup::{self, BackupManager};
use crate::block::{self, BlockFormat, Placement};
use crate::checksum::ChecksumStore;
use crate::config::StickyConfig;
use crate::daemon::DaemonSettings;
use crate::reconcile::{ReconcileSettings, Reconciler};
use crate::reload::{self, ReloadTrigger, ServiceControl, Systemctl};
use crate::store::FileStateStore;
use crate::{Error, Result, debounce, scheduler};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "STICKYCONF_CONFIG";
/// Environment variable naming the target file.
pub const TARGET_ENV: &str = "STICKYCONF_TARGET";
/// Environment variable naming the override source.
pub const OVERRIDES_ENV: &str = "STICKYCONF_OVERRIDES";
/// Environment variable naming the service to reload.
pub const SERVICE_ENV: &str = "STICKYCONF_SERVICE";
/// Environment variable overriding the data root (state, backups, log).
pub const DATA_DIR_ENV: &str = "STICKYCONF_DATA_DIR";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub overrides: Option<PathBuf>,
    pub service: Option<String>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn with_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.target = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, path: impl Into<PathBuf>) -> Self {
        self.overrides = Some(path.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub config_path: Resolved<PathBuf>,
    /// Whether config.kdl existed and was read
    pub config_loaded: bool,

    pub target: Option<Resolved<PathBuf>>,
    pub overrides: Option<Resolved<PathBuf>>,
    pub service: Option<Resolved<String>>,

    pub state_dir: Resolved<PathBuf>,
    pub backup_dir: Resolved<PathBuf>,
    pub log_file: Resolved<PathBuf>,

    pub start_marker: Resolved<String>,
    pub end_marker: Resolved<String>,
    pub comment_prefix: Resolved<String>,
    pub placement: Resolved<Placement>,

    pub debounce_secs: Resolved<u64>,
    pub fallback_interval_secs: Resolved<u64>,
    pub backup_retention_days: Resolved<u32>,
    pub log_max_lines: Resolved<usize>,
    pub log_keep_lines: Resolved<usize>,
    pub reload_timeout_secs: Resolved<u64>,
}

/// Default location of config.kdl.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("stickyconf"))
        .unwrap_or_else(|| PathBuf::from("/etc/stickyconf"))
        .join("config.kdl")
}

fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("stickyconf"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/stickyconf"))
}

/// Pick the first set value: CLI flag, then environment, then config file.
fn layered<T>(
    cli: Option<T>,
    env: Option<(T, &str)>,
    file: Option<T>,
) -> Option<Resolved<T>> {
    if let Some(value) = cli {
        Some(Resolved::new(value, ValueSource::CliFlag))
    } else if let Some((value, name)) = env {
        Some(Resolved::new(value, ValueSource::EnvVar(name.to_string())))
    } else {
        file.map(|value| Resolved::new(value, ValueSource::ConfigFile))
    }
}

/// Config file value, or the default.
fn file_or<T>(file: Option<T>, default: T) -> Resolved<T> {
    match file {
        Some(value) => Resolved::new(value, ValueSource::ConfigFile),
        None => Resolved::new(default, ValueSource::Default),
    }
}

/// Where config.kdl lives, without reading it.
pub fn locate_config<F>(overrides: &ConfigOverrides, env: &F) -> Resolved<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    layered(
        overrides.config.clone(),
        env(CONFIG_ENV).map(|v| (PathBuf::from(v), CONFIG_ENV)),
        None,
    )
    .unwrap_or_else(|| Resolved::new(default_config_path(), ValueSource::Default))
}

/// Read an environment variable, treating an empty value as unset.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolve settings from the process environment.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    resolve_config_with_env(overrides, process_env)
}

/// Resolve settings, reading environment variables through `env`.
pub fn resolve_config_with_env<F>(overrides: &ConfigOverrides, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = locate_config(overrides, &env);
    let loaded = StickyConfig::load(&config_path.value)?;
    let config_loaded = loaded.is_some();
    let mut file = loaded.unwrap_or_default();
    if let Some(base) = config_path.value.parent() {
        file.anchor_paths(base);
    }

    let data_root = env(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_data_root);

    let resolved = ResolvedConfig {
        target: layered(
            overrides.target.clone(),
            env(TARGET_ENV).map(|v| (PathBuf::from(v), TARGET_ENV)),
            file.target,
        ),
        overrides: layered(
            overrides.overrides.clone(),
            env(OVERRIDES_ENV).map(|v| (PathBuf::from(v), OVERRIDES_ENV)),
            file.overrides,
        ),
        service: layered(
            overrides.service.clone(),
            env(SERVICE_ENV).map(|v| (v, SERVICE_ENV)),
            file.service,
        ),

        state_dir: file_or(file.state_dir, data_root.join("state")),
        backup_dir: file_or(file.backup_dir, data_root.join("backups")),
        log_file: file_or(file.log_file, data_root.join("stickyconf.log")),

        start_marker: file_or(file.start_marker, block::DEFAULT_START_MARKER.to_string()),
        end_marker: file_or(file.end_marker, block::DEFAULT_END_MARKER.to_string()),
        comment_prefix: file_or(file.comment_prefix, block::DEFAULT_COMMENT_PREFIX.to_string()),
        placement: file_or(file.placement, Placement::default()),

        debounce_secs: file_or(file.debounce_secs, debounce::DEFAULT_DEBOUNCE_SECS),
        fallback_interval_secs: file_or(
            file.fallback_interval_secs,
            scheduler::DEFAULT_FALLBACK_SECS,
        ),
        backup_retention_days: file_or(
            file.backup_retention_days,
            backup::DEFAULT_RETENTION_DAYS,
        ),
        log_max_lines: file_or(file.log_max_lines, action_log::DEFAULT_MAX_LINES),
        log_keep_lines: file_or(file.log_keep_lines, action_log::DEFAULT_KEEP_LINES),
        reload_timeout_secs: file_or(file.reload_timeout_secs, reload::DEFAULT_TIMEOUT_SECS),

        config_path,
        config_loaded,
    };

    resolved.validate()?;
    Ok(resolved)
}

impl ResolvedConfig {
    /// Check constraints that span several values.
    pub fn validate(&self) -> Result<()> {
        self.block_format().validate().map_err(Error::Config)?;
        if self.log_keep_lines.value > self.log_max_lines.value {
            return Err(Error::Config(format!(
                "log-keep-lines ({}) must not exceed log-max-lines ({})",
                self.log_keep_lines.value, self.log_max_lines.value
            )));
        }
        if self.service.as_ref().is_some_and(|s| s.value.trim().is_empty()) {
            return Err(Error::Config("service must not be empty".to_string()));
        }
        Ok(())
    }

    /// Get the target path, if configured.
    pub fn target(&self) -> Option<&Path> {
        self.target.as_ref().map(|r| r.value.as_path())
    }

    /// Get the override source path, if configured.
    pub fn overrides(&self) -> Option<&Path> {
        self.overrides.as_ref().map(|r| r.value.as_path())
    }

    /// Get the service name, if configured.
    pub fn service(&self) -> Option<&str> {
        self.service.as_ref().map(|r| r.value.as_str())
    }

    pub fn block_format(&self) -> BlockFormat {
        BlockFormat::new(
            &self.start_marker.value,
            &self.end_marker.value,
            &self.comment_prefix.value,
        )
    }

    pub fn daemon_settings(&self) -> DaemonSettings {
        DaemonSettings {
            debounce: Duration::from_secs(self.debounce_secs.value),
            fallback_interval: Duration::from_secs(self.fallback_interval_secs.value),
        }
    }

    fn require_target(&self) -> Result<&Path> {
        self.target().ok_or_else(|| {
            Error::Config(format!(
                "no target file configured; use --target, {} or `target` in {}",
                TARGET_ENV,
                self.config_path.value.display()
            ))
        })
    }

    fn require_overrides(&self) -> Result<&Path> {
        self.overrides().ok_or_else(|| {
            Error::Config(format!(
                "no override source configured; use --overrides, {} or `overrides` in {}",
                OVERRIDES_ENV,
                self.config_path.value.display()
            ))
        })
    }

    pub fn reconcile_settings(&self) -> Result<ReconcileSettings> {
        Ok(ReconcileSettings {
            target: self.require_target()?.to_path_buf(),
            overrides: self.require_overrides()?.to_path_buf(),
            format: self.block_format(),
            placement: self.placement.value,
        })
    }

    /// Backups of the configured target.
    pub fn backup_manager(&self) -> Result<BackupManager> {
        Ok(BackupManager::new(
            &self.backup_dir.value,
            self.require_target()?,
            self.backup_retention_days.value,
        ))
    }

    pub fn event_log(&self) -> FileEventLog {
        FileEventLog::with_limits(
            &self.log_file.value,
            self.log_max_lines.value,
            self.log_keep_lines.value,
        )
    }

    pub fn checksum_store(&self) -> ChecksumStore {
        ChecksumStore::new(Box::new(FileStateStore::new(&self.state_dir.value)))
    }

    pub fn reload_trigger(&self) -> ReloadTrigger {
        let timeout = Duration::from_secs(self.reload_timeout_secs.value);
        let control = self
            .service()
            .map(|unit| Box::new(Systemctl::new(unit, timeout)) as Box<dyn ServiceControl>);
        ReloadTrigger::new(control)
    }

    /// Wire up a reconciler from these settings.
    pub fn build_reconciler(&self) -> Result<Reconciler> {
        Ok(Reconciler::new(
            self.reconcile_settings()?,
            self.checksum_store(),
            self.backup_manager()?,
            self.reload_trigger(),
            Box::new(self.event_log()),
        ))
    }

    /// Every setting as (key, value, source), in config file order.
    pub fn entries(&self) -> Vec<(&'static str, String, ValueSource)> {
        fn path(r: &Resolved<PathBuf>) -> (String, ValueSource) {
            (r.value.display().to_string(), r.source.clone())
        }
        fn shown<T: ToString>(r: &Resolved<T>) -> (String, ValueSource) {
            (r.value.to_string(), r.source.clone())
        }
        let unset = || ("(unset)".to_string(), ValueSource::Default);

        let rows = vec![
            ("target", self.target.as_ref().map(path).unwrap_or_else(unset)),
            ("overrides", self.overrides.as_ref().map(path).unwrap_or_else(unset)),
            ("service", self.service.as_ref().map(shown).unwrap_or_else(unset)),
            ("state-dir", path(&self.state_dir)),
            ("backup-dir", path(&self.backup_dir)),
            ("log-file", path(&self.log_file)),
            ("start-marker", shown(&self.start_marker)),
            ("end-marker", shown(&self.end_marker)),
            ("comment-prefix", shown(&self.comment_prefix)),
            ("placement", shown(&self.placement)),
            ("debounce-secs", shown(&self.debounce_secs)),
            ("fallback-interval-secs", shown(&self.fallback_interval_secs)),
            ("backup-retention-days", shown(&self.backup_retention_days)),
            ("log-max-lines", shown(&self.log_max_lines)),
            ("log-keep-lines", shown(&self.log_keep_lines)),
            ("reload-timeout-secs", shown(&self.reload_timeout_secs)),
        ];
        rows.into_iter()
            .map(|(key, (value, source))| (key, value, source))
            .collect()
    }
}
