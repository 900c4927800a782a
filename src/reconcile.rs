//! The reconciliation engine.
//!
//! Every trigger path (startup, file events, the fallback interval, one-shot
//! invocations) calls [`Reconciler::reconcile`]. A pass reads the override
//! source and the target, derives a [`Decision`], and on a mismatch runs the
//! side effects in a fixed order: backup, write, digest, reload. Any failure
//! aborts the rest of the pass; the next trigger starts over from the files
//! on disk.

use crate::action_log::{EventLog, LogLevel};
use crate::backup::BackupManager;
use crate::block::{self, BlockFormat, Placement, compose};
use crate::checksum::{ChecksumStore, content_digest};
use crate::reload::{ReloadOutcome, ReloadTrigger};
use crate::sys::write_atomic;
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// What a pass decided to do. Derived on every pass, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    InSync,
    InsertMissing,
    RemoveStale,
    ContentDrifted,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::InSync => "in_sync",
            Decision::InsertMissing => "insert_missing",
            Decision::RemoveStale => "remove_stale",
            Decision::ContentDrifted => "content_drifted",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which path asked for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    Event,
    Fallback,
    Once,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Event => "event",
            Trigger::Fallback => "fallback",
            Trigger::Once => "once",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The inputs behind a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub decision: Decision,
    /// Override source has a non-comment, non-blank line
    pub has_content: bool,
    /// Target holds a start marker followed by an end marker
    pub has_block: bool,
    /// Digest of the override source payload, when it has content
    pub desired_digest: Option<String>,
    /// Digest of the first block's payload in the target
    pub block_digest: Option<String>,
    /// Digest persisted after the last successful apply
    pub stored_digest: Option<String>,
    /// Recomposing the target from its own content would not change it
    pub layout_ok: bool,
}

/// Classify the current state. Pure; performs no I/O.
///
/// Besides comparing the first block against the source, a target whose
/// blocks are not exactly where `placement` puts them (for example a hand
/// edit to the trailing copy) counts as drifted.
pub fn assess(
    format: &BlockFormat,
    placement: Placement,
    source: &str,
    target: &str,
    stored_digest: Option<&str>,
) -> Assessment {
    let has_content = format.has_content(source);
    let has_block = format.has_block(target);

    let desired_payload = has_content.then(|| block::payload(source));
    let desired_digest = desired_payload.as_deref().map(content_digest);
    let block_digest = format
        .extract_payload(target)
        .map(|payload| content_digest(&payload));

    let layout_ok = match desired_payload.as_deref() {
        Some(payload) if has_block => {
            let block = format.build_block(payload);
            compose(&format.strip_blocks(target), &block, placement) == target
        }
        _ => true,
    };

    let decision = match (has_content, has_block) {
        (true, false) => Decision::InsertMissing,
        (false, true) => Decision::RemoveStale,
        (true, true) => {
            let drifted = desired_digest != block_digest
                || stored_digest != desired_digest.as_deref()
                || !layout_ok;
            if drifted {
                Decision::ContentDrifted
            } else {
                Decision::InSync
            }
        }
        (false, false) => Decision::InSync,
    };

    Assessment {
        decision,
        has_content,
        has_block,
        desired_digest,
        block_digest,
        stored_digest: stored_digest.map(str::to_string),
        layout_ok,
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub trigger: Trigger,
    pub decision: Decision,
    /// The target was rewritten
    pub changed: bool,
    /// Snapshot taken before the rewrite
    pub backup: Option<PathBuf>,
    pub reload: Option<ReloadOutcome>,
    /// Set when both reload and restart failed; the rewrite still stands
    pub reload_error: Option<String>,
}

impl Outcome {
    fn new(trigger: Trigger, decision: Decision) -> Self {
        Self {
            trigger,
            decision,
            changed: false,
            backup: None,
            reload: None,
            reload_error: None,
        }
    }
}

/// Files and block layout a [`Reconciler`] maintains.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub target: PathBuf,
    pub overrides: PathBuf,
    pub format: BlockFormat,
    pub placement: Placement,
}

/// Sole writer of the target file, the applied digest and the backups.
pub struct Reconciler {
    settings: ReconcileSettings,
    checksums: ChecksumStore,
    backups: BackupManager,
    reload: ReloadTrigger,
    log: Box<dyn EventLog>,
    /// Held for the whole of a pass so passes never interleave
    lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcileSettings,
        checksums: ChecksumStore,
        backups: BackupManager,
        reload: ReloadTrigger,
        log: Box<dyn EventLog>,
    ) -> Self {
        Self {
            settings,
            checksums,
            backups,
            reload,
            log,
            lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn checksums(&self) -> &ChecksumStore {
        &self.checksums
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Name of the service reloaded after a rewrite, if any.
    pub fn service(&self) -> Option<&str> {
        self.reload.service()
    }

    /// The two files whose changes should trigger a pass.
    pub fn watched_files(&self) -> Vec<PathBuf> {
        vec![self.settings.target.clone(), self.settings.overrides.clone()]
    }

    /// Run one pass. Blocks while another pass is in progress.
    pub fn reconcile(&self, trigger: Trigger) -> Result<Outcome> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.pass(trigger) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(%trigger, error = %e, "reconciliation failed");
                self.log
                    .append(LogLevel::Error, &format!("{}: pass aborted: {}", trigger, e));
                Err(e)
            }
        }
    }

    /// Classify the current state without changing anything.
    pub fn inspect(&self) -> Result<Assessment> {
        let (source, target) = self.read_inputs()?;
        let stored = self.checksums.applied()?;
        Ok(assess(
            &self.settings.format,
            self.settings.placement,
            &source,
            &target,
            stored.as_deref(),
        ))
    }

    fn pass(&self, trigger: Trigger) -> Result<Outcome> {
        let (source, target) = self.read_inputs()?;
        let stored = self.checksums.applied()?;
        let format = &self.settings.format;
        let assessment = assess(
            format,
            self.settings.placement,
            &source,
            &target,
            stored.as_deref(),
        );
        let mut outcome = Outcome::new(trigger, assessment.decision);

        tracing::debug!(
            %trigger,
            decision = %assessment.decision,
            has_content = assessment.has_content,
            has_block = assessment.has_block,
            "assessed target"
        );

        match assessment.decision {
            Decision::InSync => {
                if !assessment.has_content && assessment.stored_digest.is_some() {
                    self.checksums.clear()?;
                    tracing::info!("override source is empty, cleared applied digest");
                }
                self.log
                    .append(LogLevel::Info, &format!("{}: in sync", trigger));
                return Ok(outcome);
            }
            Decision::RemoveStale => {
                let updated = format.strip_blocks(&target);
                self.checksums.clear()?;
                self.rewrite(&target, &updated, &mut outcome)?;
            }
            Decision::InsertMissing | Decision::ContentDrifted => {
                let payload = block::payload(&source);
                let digest = content_digest(&payload);
                let block = format.build_block(&payload);
                let updated = compose(&format.strip_blocks(&target), &block, self.settings.placement);

                if updated == target {
                    // Block already correct, only the digest was missing or stale
                    self.checksums.record(&digest)?;
                    self.log.append(
                        LogLevel::Info,
                        &format!("{}: {}: block current, recorded digest", trigger, outcome.decision),
                    );
                    return Ok(outcome);
                }

                if stored.as_deref().is_some_and(|s| s != digest) {
                    self.checksums.clear()?;
                }
                self.rewrite(&target, &updated, &mut outcome)?;
                self.checksums.record(&digest)?;
            }
        }

        self.notify_reload(&mut outcome);
        Ok(outcome)
    }

    /// Back up `current`, then atomically replace the target with `updated`.
    fn rewrite(&self, current: &str, updated: &str, outcome: &mut Outcome) -> Result<()> {
        let target = &self.settings.target;

        let backup = self.backups.snapshot(current)?;
        outcome.backup = Some(backup.path.clone());

        write_atomic(target, updated.as_bytes()).map_err(|source| Error::WriteFailure {
            path: target.clone(),
            source,
        })?;
        outcome.changed = true;

        tracing::info!(
            trigger = %outcome.trigger,
            decision = %outcome.decision,
            target = %target.display(),
            backup = %backup.path.display(),
            "rewrote target"
        );
        self.log.append(
            LogLevel::Info,
            &format!(
                "{}: {}: wrote {} (backup {})",
                outcome.trigger,
                outcome.decision,
                target.display(),
                backup.path.display()
            ),
        );
        Ok(())
    }

    fn notify_reload(&self, outcome: &mut Outcome) {
        match self.reload.notify() {
            Ok(result) => {
                if result != ReloadOutcome::Skipped {
                    tracing::info!(service = self.service().unwrap_or_default(), %result, "notified service");
                    self.log
                        .append(LogLevel::Info, &format!("{}: service {}", outcome.trigger, result));
                }
                outcome.reload = Some(result);
            }
            Err(e) => {
                tracing::warn!(error = %e, "service reload failed");
                self.log.append(
                    LogLevel::Warn,
                    &format!("{}: reload failed: {}", outcome.trigger, e),
                );
                outcome.reload_error = Some(e.to_string());
            }
        }
    }

    fn read_inputs(&self) -> Result<(String, String)> {
        let source = read_required(&self.settings.overrides)?;
        if self.settings.format.contains_marker(&source) {
            return Err(Error::InvalidInput(format!(
                "{} contains a block marker line",
                self.settings.overrides.display()
            )));
        }
        let target = read_required(&self.settings.target)?;
        Ok((source, target))
    }
}

fn read_required(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::ConfigMissing {
        path: path.to_path_buf(),
        source,
    })
}
