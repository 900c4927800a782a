//! Small persistent key-value store for cross-process state.
//!
//! The reconciler keeps exactly one durable value (the applied digest), but
//! it reaches it through [`StateStore`] so tests can swap the filesystem for
//! [`MemoryStateStore`]:
//!
//! - `FileStateStore` - one file per key under the state directory (default)
//! - `MemoryStateStore` - process-local map, for tests and dry runs

pub mod file;

pub use file::FileStateStore;

use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Trait for stores that persist small string values by key.
pub trait StateStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key was never set or was removed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<()>;

    /// Describe where values live (for display purposes).
    fn location(&self) -> String;
}

/// Validate that a key is safe to use as a file name.
///
/// Keys are lowercase ASCII letters, digits and dashes.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid state key: {:?}", key)))
    }
}

/// In-memory store. Values vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("applied-digest").is_ok());
        assert!(validate_key("v2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("Upper").is_err());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v1".to_string()));

        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_remove_missing_succeeds() {
        let store = MemoryStateStore::new();
        store.remove("never-set").unwrap();
    }
}
