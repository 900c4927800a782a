//! Pre-mutation snapshots of the target file.
//!
//! Every mutating reconciliation first copies the target's current content to
//! `<backup-dir>/<target-file-name>.<UTC timestamp>.bak`, for example
//! `httpd.conf.20261019T120000.123Z.bak`. Snapshots older than the retention
//! window are pruned opportunistically after each new one.

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default retention window for snapshots, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Timestamp layout embedded in snapshot names.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Snapshot file extension.
const BACKUP_SUFFIX: &str = ".bak";

/// A snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backup {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

/// Creates, lists and prunes snapshots of one target file.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    /// File name of the target, used as the snapshot name prefix
    target_name: String,
    retention: Duration,
}

impl BackupManager {
    /// Create a manager storing snapshots of `target` under `dir`.
    pub fn new(dir: &Path, target: &Path, retention_days: u32) -> Self {
        let target_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "target".to_string());
        Self {
            dir: dir.to_path_buf(),
            target_name,
            retention: Duration::days(i64::from(retention_days)),
        }
    }

    /// Get the backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot `content` (the target's current content) now, then prune.
    pub fn snapshot(&self, content: &str) -> Result<Backup> {
        let now = Utc::now();
        let backup = self.snapshot_at(content, now)?;
        if let Err(e) = self.prune(now) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to prune backups");
        }
        Ok(backup)
    }

    /// Write a snapshot stamped `taken_at`, never overwriting an existing one.
    ///
    /// If a snapshot with the same stamp exists the stamp is moved forward by
    /// a millisecond until the name is free.
    pub fn snapshot_at(&self, content: &str, taken_at: DateTime<Utc>) -> Result<Backup> {
        let backup_err = |source: io::Error| Error::Backup {
            path: self.dir.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(backup_err)?;

        let mut stamp = taken_at;
        loop {
            let path = self.dir.join(self.file_name(stamp));
            match create_new(&path) {
                Ok(mut file) => {
                    let written = file
                        .write_all(content.as_bytes())
                        .and_then(|()| file.sync_all());
                    drop(file);
                    discard_on_error(&path, written).map_err(backup_err)?;
                    return Ok(Backup {
                        path,
                        taken_at: stamp,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    stamp += Duration::milliseconds(1);
                }
                Err(e) => return Err(backup_err(e)),
            }
        }
    }

    /// Delete snapshots older than the retention window relative to `now`.
    ///
    /// Returns the deleted paths. Files that are not snapshots of this target
    /// are left alone.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let cutoff = now - self.retention;
        let mut removed = Vec::new();
        for backup in self.list()? {
            if backup.taken_at < cutoff {
                fs::remove_file(&backup.path)?;
                tracing::debug!(path = %backup.path.display(), "pruned backup");
                removed.push(backup.path);
            }
        }
        Ok(removed)
    }

    /// All snapshots of this target, newest first.
    pub fn list(&self) -> Result<Vec<Backup>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(taken_at) = self.parse_file_name(&name) {
                backups.push(Backup {
                    path: entry.path(),
                    taken_at,
                });
            }
        }
        backups.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        Ok(backups)
    }

    /// Delete every snapshot of this target. Returns how many were removed.
    pub fn purge(&self) -> Result<usize> {
        let backups = self.list()?;
        for backup in &backups {
            fs::remove_file(&backup.path)?;
        }
        Ok(backups.len())
    }

    fn file_name(&self, taken_at: DateTime<Utc>) -> String {
        format!(
            "{}.{}{}",
            self.target_name,
            taken_at.format(TIMESTAMP_FORMAT),
            BACKUP_SUFFIX
        )
    }

    fn parse_file_name(&self, name: &str) -> Option<DateTime<Utc>> {
        let stamp = name
            .strip_prefix(self.target_name.as_str())?
            .strip_prefix('.')?
            .strip_suffix(BACKUP_SUFFIX)?;
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Open a new file for writing, failing if it exists. Snapshots may hold
/// secrets from the target, so on Unix they are readable by the owner only.
fn create_new(path: &Path) -> io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Remove a partially written snapshot so `list` never reports it.
fn discard_on_error<T>(path: &Path, result: io::Result<T>) -> io::Result<T> {
    if result.is_err() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove partial backup");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BackupManager) {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::new(
            &temp_dir.path().join("backups"),
            Path::new("/etc/svc/svc.conf"),
            7,
        );
        (temp_dir, manager)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_snapshot_copies_content() {
        let (_temp_dir, manager) = setup();

        let backup = manager.snapshot("listen 80\n").unwrap();

        assert_eq!(fs::read_to_string(&backup.path).unwrap(), "listen 80\n");
        let name = backup.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("svc.conf."));
        assert!(name.ends_with(".bak"));
    }

    #[test]
    fn test_snapshot_name_roundtrips_timestamp() {
        let (_temp_dir, manager) = setup();
        let stamp = at(19);

        let backup = manager.snapshot_at("x", stamp).unwrap();

        assert_eq!(backup.taken_at, stamp);
        assert_eq!(
            backup.path.file_name().unwrap().to_string_lossy(),
            "svc.conf.20261019T120000.000Z.bak"
        );
        assert_eq!(manager.list().unwrap(), vec![backup]);
    }

    #[test]
    fn test_snapshot_never_overwrites() {
        let (_temp_dir, manager) = setup();
        let stamp = at(19);

        let first = manager.snapshot_at("first", stamp).unwrap();
        let second = manager.snapshot_at("second", stamp).unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(fs::read_to_string(&first.path).unwrap(), "first");
        assert_eq!(fs::read_to_string(&second.path).unwrap(), "second");
    }

    #[test]
    fn test_prune_removes_only_expired() {
        let (_temp_dir, manager) = setup();
        let old = manager.snapshot_at("old", at(1)).unwrap();
        let recent = manager.snapshot_at("recent", at(15)).unwrap();

        let removed = manager.prune(at(19)).unwrap();

        assert_eq!(removed, vec![old.path.clone()]);
        assert!(!old.path.exists());
        assert!(recent.path.exists());
    }

    #[test]
    fn test_prune_ignores_foreign_files() {
        let (_temp_dir, manager) = setup();
        fs::create_dir_all(manager.dir()).unwrap();
        let foreign = manager.dir().join("other.conf.20200101T000000.000Z.bak");
        let junk = manager.dir().join("svc.conf.notatimestamp.bak");
        fs::write(&foreign, "x").unwrap();
        fs::write(&junk, "x").unwrap();

        manager.prune(at(19)).unwrap();

        assert!(foreign.exists());
        assert!(junk.exists());
    }

    #[test]
    fn test_list_newest_first() {
        let (_temp_dir, manager) = setup();
        manager.snapshot_at("a", at(10)).unwrap();
        manager.snapshot_at("c", at(12)).unwrap();
        manager.snapshot_at("b", at(11)).unwrap();

        let days: Vec<_> = manager
            .list()
            .unwrap()
            .iter()
            .map(|b| b.taken_at)
            .collect();
        assert_eq!(days, vec![at(12), at(11), at(10)]);
    }

    #[test]
    fn test_failed_write_leaves_no_snapshot() {
        let (_temp_dir, manager) = setup();
        let kept = manager.snapshot_at("a", at(10)).unwrap();
        let partial = manager.snapshot_at("half wri", at(11)).unwrap();

        let result: io::Result<()> =
            discard_on_error(&partial.path, Err(io::Error::other("disk full")));
        assert!(result.is_err());
        assert!(discard_on_error(&kept.path, Ok(())).is_ok());

        let listed: Vec<_> = manager.list().unwrap().into_iter().map(|b| b.path).collect();
        assert_eq!(listed, vec![kept.path]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let (_temp_dir, manager) = setup();
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_purge() {
        let (_temp_dir, manager) = setup();
        manager.snapshot_at("a", at(10)).unwrap();
        manager.snapshot_at("b", at(11)).unwrap();

        assert_eq!(manager.purge().unwrap(), 2);
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_fails_when_dir_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("backups");
        fs::write(&blocker, "not a directory").unwrap();
        let manager = BackupManager::new(&blocker, Path::new("svc.conf"), 7);

        let result = manager.snapshot("x");

        assert!(matches!(result, Err(Error::Backup { .. })));
    }
}
