//! File-backed state store.
//!
//! Each key is a file under the state directory whose content is the value
//! followed by a newline:
//! ```text
//! /var/lib/stickyconf/state/applied-digest
//! ```

use super::{StateStore, validate_key};
use crate::sys::write_atomic;
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Stores each key as its own file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Get the directory holding the value files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents.trim_end().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::State(format!("failed to read {}: {}", path.display(), e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key)?;
        write_atomic(&path, format!("{}\n", value).as_bytes())
            .map_err(|e| Error::State(format!("failed to write {}: {}", path.display(), e)))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::State(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
