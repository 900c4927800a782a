//! Command implementations for the stickyconf CLI.
//!
//! Each command resolves what it needs from a [`ResolvedConfig`] and returns
//! a result value that renders as JSON or as human-readable text:
//! - `run` / `once` - reconciliation
//! - `status` - read-only assessment
//! - `backups_*` - snapshot management
//! - `config_*` - configuration inspection and bootstrap

use crate::backup::Backup;
use crate::block::Placement;
use crate::config::{self, ConfigOverrides, ResolvedConfig, StickyConfig, ValueSource};
use crate::daemon;
use crate::reconcile::{Decision, Outcome, Trigger};
use crate::sys::write_atomic;
use crate::{Error, Result, backup, debounce, scheduler};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

// === run / once ===

/// Run the daemon until SIGINT or SIGTERM.
pub fn run(config: &ResolvedConfig) -> Result<()> {
    let reconciler = Arc::new(config.build_reconciler()?);
    daemon::run(reconciler, config.daemon_settings())
}

#[derive(Serialize)]
pub struct OnceResult {
    pub target: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Output for OnceResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let o = &self.outcome;
        let mut lines = Vec::new();
        if o.changed {
            lines.push(format!("{} ({}): rewrote {}", o.decision, o.trigger, self.target.display()));
        } else if o.decision == Decision::InSync {
            lines.push(format!("{} ({}): {} unchanged", o.decision, o.trigger, self.target.display()));
        } else {
            lines.push(format!(
                "{} ({}): {} already current, recorded digest",
                o.decision,
                o.trigger,
                self.target.display()
            ));
        }
        if let Some(ref backup) = o.backup {
            lines.push(format!("  backup:  {}", backup.display()));
        }
        if let Some(reload) = o.reload {
            lines.push(format!("  service: {}", reload));
        }
        if let Some(ref err) = o.reload_error {
            lines.push(format!("  service: reload failed: {}", err));
        }
        lines.join("\n")
    }
}

/// Run a single reconciliation pass.
pub fn once(config: &ResolvedConfig) -> Result<OnceResult> {
    let reconciler = config.build_reconciler()?;
    let outcome = reconciler.reconcile(Trigger::Once)?;
    Ok(OnceResult {
        target: reconciler.settings().target.clone(),
        outcome,
    })
}

// === status ===

#[derive(Serialize)]
pub struct StatusResult {
    pub target: PathBuf,
    pub overrides: PathBuf,
    pub service: Option<String>,
    pub decision: Decision,
    pub has_content: bool,
    pub has_block: bool,
    pub desired_digest: Option<String>,
    pub block_digest: Option<String>,
    pub stored_digest: Option<String>,
    pub placement: Placement,
    pub backup_count: usize,
    pub latest_backup: Option<DateTime<Utc>>,
    pub state: String,
    pub log_file: PathBuf,
    /// Most recent event log lines, oldest first
    pub recent_events: Vec<String>,
}

/// Event log lines shown by `status`.
const STATUS_LOG_LINES: usize = 5;

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let state = match self.decision {
            Decision::InSync if self.has_block => "in sync (overrides applied)",
            Decision::InSync => "in sync (no overrides)",
            Decision::InsertMissing => "overrides missing from target",
            Decision::RemoveStale => "stale block in target",
            Decision::ContentDrifted => "block drifted from overrides",
        };
        let short = |d: &Option<String>| {
            d.as_deref()
                .map(|d| d.chars().take(12).collect::<String>())
                .unwrap_or_else(|| "-".to_string())
        };

        let mut lines = vec![
            format!("Status: {}", state),
            format!("  next pass:  {}", self.decision),
            format!("  target:     {}", self.target.display()),
            format!("  overrides:  {}", self.overrides.display()),
            format!("  service:    {}", self.service.as_deref().unwrap_or("(none)")),
            format!("  placement:  {}", self.placement),
            format!(
                "  digests:    desired {}  block {}  stored {}",
                short(&self.desired_digest),
                short(&self.block_digest),
                short(&self.stored_digest)
            ),
        ];
        match self.latest_backup {
            Some(at) => lines.push(format!(
                "  backups:    {} (latest {})",
                self.backup_count,
                at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => lines.push("  backups:    0".to_string()),
        }
        lines.push(format!("  state:      {}", self.state));
        lines.push(format!("  log:        {}", self.log_file.display()));
        if !self.recent_events.is_empty() {
            lines.push(String::new());
            lines.push("Recent events:".to_string());
            for event in &self.recent_events {
                lines.push(format!("  {}", event));
            }
        }
        lines.join("\n")
    }
}

/// Report what the next pass would do.
pub fn status(config: &ResolvedConfig) -> Result<StatusResult> {
    let reconciler = config.build_reconciler()?;
    let assessment = reconciler.inspect()?;
    let backups = reconciler.backups().list()?;
    let settings = reconciler.settings();
    let log = config.event_log();

    Ok(StatusResult {
        target: settings.target.clone(),
        overrides: settings.overrides.clone(),
        service: reconciler.service().map(str::to_string),
        decision: assessment.decision,
        has_content: assessment.has_content,
        has_block: assessment.has_block,
        desired_digest: assessment.desired_digest,
        block_digest: assessment.block_digest,
        stored_digest: assessment.stored_digest,
        placement: settings.placement,
        backup_count: backups.len(),
        latest_backup: backups.first().map(|b| b.taken_at),
        state: reconciler.checksums().location(),
        log_file: log.path().to_path_buf(),
        recent_events: log.tail(STATUS_LOG_LINES)?,
    })
}

// === backups ===

#[derive(Serialize)]
pub struct BackupList {
    pub dir: PathBuf,
    pub count: usize,
    pub backups: Vec<Backup>,
}

impl Output for BackupList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.backups.is_empty() {
            return format!("No backups in {}", self.dir.display());
        }
        let mut lines = vec![format!("{} backup(s) in {}:", self.count, self.dir.display())];
        for backup in &self.backups {
            lines.push(format!(
                "  {}  {}",
                backup.taken_at.format("%Y-%m-%d %H:%M:%S"),
                backup.path.display()
            ));
        }
        lines.join("\n")
    }
}

pub fn backups_list(config: &ResolvedConfig) -> Result<BackupList> {
    let manager = config.backup_manager()?;
    let backups = manager.list()?;
    Ok(BackupList {
        dir: manager.dir().to_path_buf(),
        count: backups.len(),
        backups,
    })
}

#[derive(Serialize)]
pub struct BackupsRemoved {
    pub dir: PathBuf,
    pub removed: usize,
    pub retention_days: Option<u32>,
}

impl Output for BackupsRemoved {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match self.retention_days {
            Some(days) => format!(
                "Removed {} backup(s) older than {} day(s) from {}",
                self.removed,
                days,
                self.dir.display()
            ),
            None => format!("Removed {} backup(s) from {}", self.removed, self.dir.display()),
        }
    }
}

/// Delete snapshots older than the retention window.
pub fn backups_prune(config: &ResolvedConfig) -> Result<BackupsRemoved> {
    let manager = config.backup_manager()?;
    let removed = manager.prune(Utc::now())?;
    Ok(BackupsRemoved {
        dir: manager.dir().to_path_buf(),
        removed: removed.len(),
        retention_days: Some(config.backup_retention_days.value),
    })
}

/// Delete every snapshot.
pub fn backups_purge(config: &ResolvedConfig) -> Result<BackupsRemoved> {
    let manager = config.backup_manager()?;
    let removed = manager.purge()?;
    Ok(BackupsRemoved {
        dir: manager.dir().to_path_buf(),
        removed,
        retention_days: None,
    })
}

// === config ===

#[derive(Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: ValueSource,
}

#[derive(Serialize)]
pub struct ConfigShow {
    pub config_path: PathBuf,
    pub config_loaded: bool,
    pub settings: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let state = if self.config_loaded { "" } else { " (not found, using defaults)" };
        let mut lines = vec![format!("Config file: {}{}", self.config_path.display(), state)];
        let width = self.settings.iter().map(|e| e.key.len()).max().unwrap_or(0);
        for entry in &self.settings {
            lines.push(format!(
                "  {:width$}  {}  [{}]",
                entry.key,
                entry.value,
                entry.source,
                width = width
            ));
        }
        lines.join("\n")
    }
}

pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    ConfigShow {
        config_path: config.config_path.value.clone(),
        config_loaded: config.config_loaded,
        settings: config
            .entries()
            .into_iter()
            .map(|(key, value, source)| ConfigEntry { key, value, source })
            .collect(),
    }
}

#[derive(Serialize)]
pub struct ConfigInit {
    pub path: PathBuf,
    pub overwritten: bool,
}

impl Output for ConfigInit {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let verb = if self.overwritten { "Overwrote" } else { "Wrote" };
        format!("{} {}", verb, self.path.display())
    }
}

const CONFIG_HEADER: &str = "\
// stickyconf configuration
//
// target:    file owned by the service, kept merged with the overrides
// overrides: directives to keep in the target (lines starting with # are ignored)
// service:   systemd unit to reload after the target is rewritten (optional)
";

/// The config written by `config init`: explicit flags plus every default.
pub fn starter_config(overrides: &ConfigOverrides) -> StickyConfig {
    StickyConfig {
        target: overrides.target.clone(),
        overrides: overrides.overrides.clone(),
        service: overrides.service.clone(),
        placement: Some(Placement::default()),
        debounce_secs: Some(debounce::DEFAULT_DEBOUNCE_SECS),
        fallback_interval_secs: Some(scheduler::DEFAULT_FALLBACK_SECS),
        backup_retention_days: Some(backup::DEFAULT_RETENTION_DAYS),
        ..Default::default()
    }
}

/// Write a starter config.kdl to the resolved config location.
pub fn config_init(overrides: &ConfigOverrides, force: bool) -> Result<ConfigInit> {
    let path = config::locate_config(overrides, &config::process_env).value;
    write_starter_config(&path, overrides, force)
}

fn write_starter_config(path: &Path, overrides: &ConfigOverrides, force: bool) -> Result<ConfigInit> {
    let exists = path.exists();
    if exists && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let mut doc = starter_config(overrides).to_kdl();
    doc.autoformat();
    let content = format!("{}\n{}", CONFIG_HEADER, doc);
    write_atomic(path, content.as_bytes())?;

    #[cfg(unix)]
    if !exists {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            path,
            std::fs::Permissions::from_mode(config::CONFIG_FILE_MODE),
        )?;
    }

    Ok(ConfigInit {
        path: path.to_path_buf(),
        overwritten: exists,
    })
}
