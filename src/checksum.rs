//! Applied-digest bookkeeping.
//!
//! The digest is a hex SHA-256 of the canonical override payload, recorded
//! right after that payload was written into the target. Absence means no
//! successful apply is known.

use crate::Result;
use crate::store::StateStore;
use sha2::{Digest, Sha256};

/// Key under which the applied digest is stored.
pub const APPLIED_DIGEST_KEY: &str = "applied-digest";

/// Hex SHA-256 of `payload`.
pub fn content_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_digest(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Reads and writes the applied digest through a [`StateStore`].
pub struct ChecksumStore {
    store: Box<dyn StateStore>,
}

impl ChecksumStore {
    pub fn new(store: Box<dyn StateStore>) -> Self {
        Self { store }
    }

    /// The digest of the last successfully applied payload.
    ///
    /// A stored value that is not a hex SHA-256 is treated as absent.
    pub fn applied(&self) -> Result<Option<String>> {
        match self.store.get(APPLIED_DIGEST_KEY)? {
            Some(value) if is_digest(&value) => Ok(Some(value)),
            Some(value) => {
                tracing::warn!(value = %value, "ignoring malformed applied digest");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Record `digest` as applied.
    pub fn record(&self, digest: &str) -> Result<()> {
        self.store.set(APPLIED_DIGEST_KEY, digest)
    }

    /// Forget the applied digest.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(APPLIED_DIGEST_KEY)
    }

    /// Where the digest is persisted (for display purposes).
    pub fn location(&self) -> String {
        self.store.location()
    }
}
