//! Durable, size-bounded record of reconciliation decisions and actions.
//!
//! The log uses a simple text format with timestamps, one line per entry:
//! ```text
//! 2026-10-19T12:00:00Z [INFO] startup: insert_missing: wrote block into /etc/svc/svc.conf
//! 2026-10-19T12:00:00Z [WARN] startup: reload failed: `systemctl reload svc` exited with 1
//! 2026-10-19T12:03:00Z [INFO] fallback: in sync
//! ```
//!
//! Once the file holds more than `max_lines` entries it is rewritten to keep
//! only the most recent `keep_lines`.

use crate::sys::write_atomic;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Default line count above which the log is truncated.
pub const DEFAULT_MAX_LINES: usize = 1000;

/// Default number of lines kept after truncation.
pub const DEFAULT_KEEP_LINES: usize = 500;

/// Log levels for reconciliation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Messages stay on one line so truncation can count entries by lines
        let message = self.message.replace('\n', " ");
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.level,
            message
        )
    }
}

/// Sink for reconciliation events.
///
/// Appending never fails from the caller's point of view: a broken log must
/// not stop the target file from being reconciled.
pub trait EventLog: Send + Sync {
    fn append(&self, level: LogLevel, message: &str);
}

/// Append-only text log that truncates itself to its most recent lines.
#[derive(Debug)]
pub struct FileEventLog {
    path: PathBuf,
    max_lines: usize,
    keep_lines: usize,
    /// Lines currently in the file, counted lazily on first append
    line_count: Mutex<Option<usize>>,
}

impl FileEventLog {
    /// Create a log at `path` with the default bounds.
    pub fn new(path: &Path) -> Self {
        Self::with_limits(path, DEFAULT_MAX_LINES, DEFAULT_KEEP_LINES)
    }

    /// Create a log at `path` that keeps `keep_lines` once it exceeds `max_lines`.
    pub fn with_limits(path: &Path, max_lines: usize, keep_lines: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            max_lines: max_lines.max(1),
            keep_lines: keep_lines.min(max_lines).max(1),
            line_count: Mutex::new(None),
        }
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last `n` lines of the log.
    pub fn tail(&self, n: usize) -> io::Result<Vec<String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }

    fn write_entry(&self, entry: &LogEntry) -> io::Result<()> {
        let mut count = self
            .line_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let current = match *count {
            Some(n) => n,
            None => count_lines(&self.path)?,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry)?;

        let mut total = current + 1;
        if total > self.max_lines {
            total = self.truncate()?;
        }
        *count = Some(total);

        Ok(())
    }

    /// Rewrite the file with only its most recent `keep_lines` lines.
    fn truncate(&self) -> io::Result<usize> {
        let contents = fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(self.keep_lines);
        let mut kept = lines[start..].join("\n");
        kept.push('\n');
        write_atomic(&self.path, kept.as_bytes())?;
        Ok(lines.len() - start)
    }
}

fn count_lines(path: &Path) -> io::Result<usize> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.lines().count()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

impl EventLog for FileEventLog {
    fn append(&self, level: LogLevel, message: &str) {
        let entry = LogEntry::new(level, message);
        if let Err(e) = self.write_entry(&entry) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write event log");
        }
    }
}

/// In-memory log, for tests.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, level: LogLevel, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry::new(level, message));
    }
}

impl<T: EventLog + ?Sized> EventLog for std::sync::Arc<T> {
    fn append(&self, level: LogLevel, message: &str) {
        (**self).append(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_level_display() {
        assert_eq!(format!("{}", LogLevel::Info), "INFO");
        assert_eq!(format!("{}", LogLevel::Warn), "WARN");
        assert_eq!(format!("{}", LogLevel::Error), "ERROR");
    }

    #[test]
    fn test_entry_format_is_single_line() {
        let entry = LogEntry::new(LogLevel::Warn, "first\nsecond");
        let line = entry.to_string();
        assert!(line.contains("[WARN] first second"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_append_creates_file_and_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("stickyconf.log");
        let log = FileEventLog::new(&path);

        log.append(LogLevel::Info, "Test message");

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[INFO] Test message"));
    }

    #[test]
    fn test_append_appends_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stickyconf.log");
        let log = FileEventLog::new(&path);

        log.append(LogLevel::Info, "First message");
        log.append(LogLevel::Warn, "Second message");
        log.append(LogLevel::Error, "Third message");

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[INFO] First message"));
        assert!(lines[1].contains("[WARN] Second message"));
        assert!(lines[2].contains("[ERROR] Third message"));
    }

    #[test]
    fn test_truncates_to_most_recent_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stickyconf.log");
        let log = FileEventLog::with_limits(&path, 10, 4);

        for i in 0..11 {
            log.append(LogLevel::Info, &format!("entry {}", i));
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("entry 7"));
        assert!(lines[3].ends_with("entry 10"));

        // Counting continues from the truncated size
        for i in 11..17 {
            log.append(LogLevel::Info, &format!("entry {}", i));
        }
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 10);
    }

    #[test]
    fn test_existing_file_counts_toward_limit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stickyconf.log");
        let existing: String = (0..5).map(|i| format!("old {}\n", i)).collect();
        fs::write(&path, existing).unwrap();

        let log = FileEventLog::with_limits(&path, 5, 2);
        log.append(LogLevel::Info, "new");

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["old 4", lines[1]]);
        assert!(lines[1].ends_with("new"));
    }

    #[test]
    fn test_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stickyconf.log");
        let log = FileEventLog::new(&path);
        assert!(log.tail(3).unwrap().is_empty());

        for i in 0..5 {
            log.append(LogLevel::Info, &format!("m{}", i));
        }
        let tail = log.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].ends_with("m3"));
        assert!(tail[1].ends_with("m4"));
    }

    #[test]
    fn test_memory_log_records_entries() {
        let log = MemoryEventLog::new();
        log.append(LogLevel::Info, "one");
        log.append(LogLevel::Error, "two");
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(entries[1].message, "two");
    }
}
