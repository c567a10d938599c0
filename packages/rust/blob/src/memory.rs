//! In-process blob backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use contextrelay_shared::{BackendError, BackendResult};
use tokio::sync::RwLock;

use crate::{BlobMeta, BlobStore, validate_key};

/// Blob store backed by a shared map. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop the object at `key`, returning whether it existed.
    pub async fn remove(&self, key: &str) -> bool {
        self.objects.write().await.remove(key).is_some()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> BackendResult<BlobMeta> {
        validate_key(key)?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(BlobMeta::for_bytes(key, bytes))
    }

    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> BackendResult<BlobMeta> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(BackendError::AlreadyExists {
                key: key.to_string(),
            });
        }
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(BlobMeta::for_bytes(key, bytes))
    }

    async fn get(&self, key: &str) -> BackendResult<Vec<u8>> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::not_found(key))
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_objects() {
        let store = MemoryBlobStore::new();
        let other = store.clone();
        store.put("a/b.json", b"{}").await.unwrap();
        assert_eq!(other.get("a/b.json").await.unwrap(), b"{}");
        assert_eq!(other.keys().await, vec!["a/b.json".to_string()]);
    }

    #[tokio::test]
    async fn put_if_absent_and_remove() {
        let store = MemoryBlobStore::new();
        store.put_if_absent("k/v", b"1").await.unwrap();
        assert!(matches!(
            store.put_if_absent("k/v", b"2").await,
            Err(BackendError::AlreadyExists { .. })
        ));
        assert!(store.remove("k/v").await);
        assert!(matches!(
            store.get("k/v").await,
            Err(BackendError::NotFound { .. })
        ));
    }
}
