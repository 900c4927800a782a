//! File-system change notifications for the target and the override source.
//!
//! The watch sits on each file's parent directory rather than on the file:
//! services and editors commonly replace a file by renaming a new one over
//! it, which would orphan a watch on the old inode. Events are filtered down
//! to the watched file names before they are forwarded.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Delay between attempts to re-establish a lost watch.
const RETRY_DELAY_SECS: u64 = 5;

/// Capacity of the channel between the notify thread and the event loop.
const RAW_CHANNEL_CAPACITY: usize = 100;

type RawEvent = Result<Event, notify::Error>;

/// Watches a fixed set of files and forwards a path for each relevant change.
#[derive(Debug, Clone)]
pub struct EventSource {
    files: Vec<PathBuf>,
    retry_delay: Duration,
}

impl EventSource {
    /// Watch `files`. Relative paths are resolved against the current directory.
    pub fn new(files: &[PathBuf]) -> Self {
        let files = files
            .iter()
            .map(|f| std::path::absolute(f).unwrap_or_else(|_| f.clone()))
            .collect();
        Self {
            files,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECS),
        }
    }

    /// Set the delay between attempts to re-establish a lost watch.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Unique parent directories of the watched files.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let dirs: BTreeSet<PathBuf> = self
            .files
            .iter()
            .filter_map(|f| f.parent().map(Path::to_path_buf))
            .collect();
        dirs.into_iter().collect()
    }

    /// The watched file an event concerns, if any.
    ///
    /// Access events are ignored; creation, modification (including renames),
    /// removal and unclassified events count.
    pub fn relevant_path(&self, event: &Event) -> Option<PathBuf> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any => {}
            _ => return None,
        }
        event
            .paths
            .iter()
            .find(|p| self.files.iter().any(|f| f == *p))
            .cloned()
    }

    /// Whether an event means a watched directory itself is gone.
    pub fn is_watch_lost(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Remove(_))
            && event
                .paths
                .iter()
                .any(|p| self.watched_dirs().iter().any(|d| d == p))
    }

    fn establish(&self, raw_tx: &mpsc::Sender<RawEvent>) -> notify::Result<RecommendedWatcher> {
        let tx = raw_tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: RawEvent| {
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )?;

        for dir in self.watched_dirs() {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        }
        Ok(watcher)
    }

    /// Keep trying to set up the watch until it succeeds or shutdown is
    /// requested (`None`).
    async fn establish_with_retry(
        &self,
        raw_tx: &mpsc::Sender<RawEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<RecommendedWatcher> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            match self.establish(raw_tx) {
                Ok(watcher) => {
                    tracing::info!(dirs = ?self.watched_dirs(), "watching for changes");
                    return Some(watcher);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_secs = self.retry_delay.as_secs_f64(),
                        "failed to establish file watch, fallback interval still applies"
                    );
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Forward relevant changes to `changes` until shutdown.
    ///
    /// A lost watch is torn down and re-established; once it is back a
    /// change is forwarded so anything missed in between gets reconciled.
    /// Dropping out of this function drops `changes`, which ends the
    /// downstream debouncer.
    pub async fn run(self, changes: mpsc::Sender<PathBuf>, mut shutdown: watch::Receiver<bool>) {
        let (raw_tx, mut raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);

        let Some(mut watcher) = self.establish_with_retry(&raw_tx, &mut shutdown).await else {
            return;
        };

        loop {
            let lost = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    false
                }
                raw = raw_rx.recv() => match raw {
                    Some(Ok(event)) => {
                        if self.is_watch_lost(&event) {
                            tracing::warn!(paths = ?event.paths, "watched directory removed");
                            true
                        } else {
                            if let Some(path) = self.relevant_path(&event) {
                                tracing::trace!(path = %path.display(), kind = ?event.kind, "file changed");
                                if changes.send(path).await.is_err() {
                                    break;
                                }
                            }
                            false
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "file watch failed");
                        true
                    }
                    None => break,
                },
            };

            if lost {
                drop(watcher);
                watcher = match self.establish_with_retry(&raw_tx, &mut shutdown).await {
                    Some(watcher) => watcher,
                    None => break,
                };
                if let Some(first) = self.files.first() {
                    if changes.send(first.clone()).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("event source stopped");
    }
}
