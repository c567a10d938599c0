//! Blob store adapter for context payloads.
//!
//! A [`BlobStore`] holds opaque byte payloads addressed by hierarchical,
//! `/`-separated keys. Two backends ship with the crate:
//! - [`FsBlobStore`]: objects as files under a root directory
//! - [`MemoryBlobStore`]: a process-local map, for tests and embedding
//!
//! Backends report definitive absence as [`BackendError::NotFound`] and every
//! other fault as [`BackendError::Unavailable`], so callers can decide whether
//! a retry makes sense.

mod fs;
mod memory;

use async_trait::async_trait;
use contextrelay_shared::{BackendError, BackendResult};
use sha2::{Digest, Sha256};

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Metadata returned by a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    /// Key the object was written to.
    pub key: String,
    /// Payload size in bytes.
    pub size_bytes: usize,
    /// Hex SHA-256 of the payload.
    pub sha256: String,
}

impl BlobMeta {
    pub fn for_bytes(key: &str, bytes: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            size_bytes: bytes.len(),
            sha256: sha256_hex(bytes),
        }
    }
}

/// Durable object storage addressed by hierarchical keys.
///
/// Writes must be atomic at the object level: a concurrent reader sees either
/// the previous object or the new one, never a partial write.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8]) -> BackendResult<BlobMeta>;

    /// Write `bytes` at `key` only if no object exists there yet.
    ///
    /// Fails with [`BackendError::AlreadyExists`] when the key is taken.
    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> BackendResult<BlobMeta>;

    /// Read the object at `key`.
    async fn get(&self, key: &str) -> BackendResult<Vec<u8>>;

    /// Whether an object exists at `key`.
    ///
    /// The context store never calls this: its reads go straight to `get` and
    /// its repair copy relies on `put_if_absent`. It is part of the trait for
    /// embedders inspecting storage and for tests.
    async fn exists(&self, key: &str) -> BackendResult<bool>;
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check that `key` is a relative `/`-separated path without empty, `.` or
/// `..` segments and without backslashes.
pub fn validate_key(key: &str) -> BackendResult<()> {
    let invalid = |reason: &str| BackendError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("empty, '.' or '..' segment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys_pass() {
        assert!(validate_key("videos/proj-1/01-context/topic-context.json").is_ok());
        assert!(validate_key("single").is_ok());
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        for key in [
            "",
            "/abs/path",
            "a//b",
            "a/./b",
            "a/../b",
            "trailing/",
            "win\\path",
        ] {
            let err = validate_key(key).unwrap_err();
            assert!(
                matches!(err, BackendError::InvalidKey { .. }),
                "expected InvalidKey for {key:?}"
            );
        }
    }

    #[test]
    fn meta_hashes_payload() {
        let meta = BlobMeta::for_bytes("k", b"hello");
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(
            meta.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
