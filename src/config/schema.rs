//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The [`StickyConfig`] struct mirroring the file
//! - Conversion to and from KDL documents
//! - Per-field validation
//!
//! ```kdl
//! target "/etc/httpd/conf/httpd.conf"
//! overrides "/etc/stickyconf/overrides.conf"
//! service "httpd"
//! placement "both"
//! debounce-secs 10
//! fallback-interval-secs 180
//! backup-retention-days 7
//! ```

use crate::block::Placement;
use crate::{Error, Result};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of config.kdl. Every field is optional; unset fields fall
/// through to environment variables or built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyConfig {
    /// File owned by the service, kept merged with the overrides
    pub target: Option<PathBuf>,
    /// User-edited override source
    pub overrides: Option<PathBuf>,
    /// systemd unit to reload after a rewrite
    pub service: Option<String>,

    pub state_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,

    pub start_marker: Option<String>,
    pub end_marker: Option<String>,
    pub comment_prefix: Option<String>,
    pub placement: Option<Placement>,

    pub debounce_secs: Option<u64>,
    pub fallback_interval_secs: Option<u64>,
    pub backup_retention_days: Option<u32>,
    pub log_max_lines: Option<usize>,
    pub log_keep_lines: Option<usize>,
    pub reload_timeout_secs: Option<u64>,
}

impl StickyConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read config.kdl. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let doc: KdlDocument = content.parse()?;
        let config = Self::from_kdl(&doc)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    /// Validate the values that are set.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("debounce-secs", self.debounce_secs),
            ("fallback-interval-secs", self.fallback_interval_secs),
            ("reload-timeout-secs", self.reload_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(format!("{} must be greater than 0", name));
            }
        }
        if self.log_max_lines == Some(0) || self.log_keep_lines == Some(0) {
            return Err("log-max-lines and log-keep-lines must be greater than 0".to_string());
        }
        for (name, value) in [
            ("start-marker", &self.start_marker),
            ("end-marker", &self.end_marker),
            ("comment-prefix", &self.comment_prefix),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(format!("{} must not be empty", name));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes are ignored; known nodes with the wrong value type are
    /// an error.
    pub fn from_kdl(doc: &KdlDocument) -> std::result::Result<Self, String> {
        let mut config = Self::new();

        for node in doc.nodes() {
            let name = node.name().value();
            match name {
                "target" => config.target = Some(path_arg(node)?),
                "overrides" => config.overrides = Some(path_arg(node)?),
                "service" => config.service = Some(string_arg(node)?),
                "state-dir" => config.state_dir = Some(path_arg(node)?),
                "backup-dir" => config.backup_dir = Some(path_arg(node)?),
                "log-file" => config.log_file = Some(path_arg(node)?),
                "start-marker" => config.start_marker = Some(string_arg(node)?),
                "end-marker" => config.end_marker = Some(string_arg(node)?),
                "comment-prefix" => config.comment_prefix = Some(string_arg(node)?),
                "placement" => {
                    let value = string_arg(node)?;
                    config.placement = Some(Placement::parse(&value).ok_or_else(|| {
                        format!("placement must be both, prepend or append, got {:?}", value)
                    })?);
                }
                "debounce-secs" => config.debounce_secs = Some(integer_arg(node)?),
                "fallback-interval-secs" => {
                    config.fallback_interval_secs = Some(integer_arg(node)?)
                }
                "backup-retention-days" => {
                    config.backup_retention_days = Some(integer_arg(node)?)
                }
                "log-max-lines" => config.log_max_lines = Some(integer_arg(node)?),
                "log-keep-lines" => config.log_keep_lines = Some(integer_arg(node)?),
                "reload-timeout-secs" => config.reload_timeout_secs = Some(integer_arg(node)?),
                _ => {
                    tracing::debug!(node = name, "ignoring unknown config node");
                }
            }
        }

        Ok(config)
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        let strings = [
            ("target", self.target.as_ref().map(|p| p.display().to_string())),
            ("overrides", self.overrides.as_ref().map(|p| p.display().to_string())),
            ("service", self.service.clone()),
            ("state-dir", self.state_dir.as_ref().map(|p| p.display().to_string())),
            ("backup-dir", self.backup_dir.as_ref().map(|p| p.display().to_string())),
            ("log-file", self.log_file.as_ref().map(|p| p.display().to_string())),
            ("start-marker", self.start_marker.clone()),
            ("end-marker", self.end_marker.clone()),
            ("comment-prefix", self.comment_prefix.clone()),
            ("placement", self.placement.map(|p| p.as_str().to_string())),
        ];
        for (name, value) in strings {
            if let Some(value) = value {
                let mut node = KdlNode::new(name);
                node.push(KdlEntry::new(KdlValue::String(value)));
                doc.nodes_mut().push(node);
            }
        }

        let integers = [
            ("debounce-secs", self.debounce_secs.map(i128::from)),
            ("fallback-interval-secs", self.fallback_interval_secs.map(i128::from)),
            ("backup-retention-days", self.backup_retention_days.map(i128::from)),
            ("log-max-lines", self.log_max_lines.map(|v| v as i128)),
            ("log-keep-lines", self.log_keep_lines.map(|v| v as i128)),
            ("reload-timeout-secs", self.reload_timeout_secs.map(i128::from)),
        ];
        for (name, value) in integers {
            if let Some(value) = value {
                let mut node = KdlNode::new(name);
                node.push(KdlEntry::new(KdlValue::Integer(value)));
                doc.nodes_mut().push(node);
            }
        }

        doc
    }

    /// Resolve relative paths against `base` (the directory holding config.kdl).
    pub fn anchor_paths(&mut self, base: &Path) {
        for slot in [
            &mut self.target,
            &mut self.overrides,
            &mut self.state_dir,
            &mut self.backup_dir,
            &mut self.log_file,
        ] {
            if let Some(path) = slot.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

/// Get the string argument from a node's first entry.
fn string_arg(node: &KdlNode) -> std::result::Result<String, String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("{} expects a string value", node.name().value()))
}

fn path_arg(node: &KdlNode) -> std::result::Result<PathBuf, String> {
    string_arg(node).map(PathBuf::from)
}

/// Get a non-negative integer argument from a node's first entry.
fn integer_arg<T: TryFrom<i128>>(node: &KdlNode) -> std::result::Result<T, String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .and_then(|i| T::try_from(i).ok())
        .ok_or_else(|| {
            format!(
                "{} expects a non-negative integer value",
                node.name().value()
            )
        })
}
