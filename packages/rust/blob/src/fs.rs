//! Filesystem blob backend.
//!
//! Each key maps to a file under the root directory. Writes go to a unique
//! temp file in the target directory first, then move into place, so readers
//! never observe a partially written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use contextrelay_shared::{BackendError, BackendResult, ContextRelayError, Result};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{BlobMeta, BlobStore, validate_key};

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| ContextRelayError::io(&root, e))?;

        info!(path = %root.display(), "opened filesystem blob store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> BackendResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    /// Write `bytes` to a fresh temp file next to `target`.
    async fn write_temp(&self, target: &Path, bytes: &[u8]) -> BackendResult<TempFile> {
        let dir = target
            .parent()
            .ok_or_else(|| BackendError::unavailable(format!("{} has no parent", target.display())))?;
        fs::create_dir_all(dir)
            .await
            .map_err(|e| io_error(dir, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Guard first: a write cancelled by a caller timeout still cleans up.
        let temp = TempFile::new(dir.join(format!(".{file_name}.{}.tmp", Uuid::now_v7())));
        fs::write(temp.path(), bytes)
            .await
            .map_err(|e| io_error(temp.path(), e))?;
        Ok(temp)
    }
}

/// Temp file removed on drop unless it was moved into place.
#[derive(Debug)]
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file now lives under another name; nothing to remove.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> BackendResult<BlobMeta> {
        let target = self.object_path(key)?;
        let temp = self.write_temp(&target, bytes).await?;

        fs::rename(temp.path(), &target)
            .await
            .map_err(|e| io_error(&target, e))?;
        temp.disarm();

        debug!(key, size = bytes.len(), "wrote blob");
        Ok(BlobMeta::for_bytes(key, bytes))
    }

    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> BackendResult<BlobMeta> {
        let target = self.object_path(key)?;
        let temp = self.write_temp(&target, bytes).await?;

        // hard_link refuses to replace an existing file, which makes the
        // existence check and the publish a single step.
        let linked = fs::hard_link(temp.path(), &target).await;
        drop(temp);

        match linked {
            Ok(()) => {
                debug!(key, size = bytes.len(), "wrote blob (create-only)");
                Ok(BlobMeta::for_bytes(key, bytes))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(BackendError::AlreadyExists {
                key: key.to_string(),
            }),
            Err(e) => Err(io_error(&target, e)),
        }
    }

    async fn get(&self, key: &str) -> BackendResult<Vec<u8>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackendError::not_found(key)),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let path = self.object_path(key)?;
        fs::try_exists(&path).await.map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> BackendError {
    BackendError::unavailable(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> FsBlobStore {
        let root = std::env::temp_dir().join(format!("cr_blobs_{}", Uuid::now_v7()));
        FsBlobStore::open(&root).await.expect("open blob store")
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = test_store().await;
        let key = "videos/proj-1/01-context/topic-context.json";

        let meta = store.put(key, br#"{"selectedTopic":"Travel"}"#).await.expect("put");
        assert_eq!(meta.key, key);
        assert_eq!(meta.size_bytes, 26);

        let bytes = store.get(key).await.expect("get");
        assert_eq!(bytes, br#"{"selectedTopic":"Travel"}"#);
        assert!(store.exists(key).await.unwrap());
        assert!(store.root().join("videos/proj-1/01-context/topic-context.json").exists());
    }

    #[tokio::test]
    async fn put_overwrites_and_leaves_no_temp_files() {
        let store = test_store().await;
        let key = "videos/p/01-context/scene-context.json";
        store.put(key, b"first").await.unwrap();
        store.put(key, b"second").await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), b"second");

        let mut entries = std::fs::read_dir(store.root().join("videos/p/01-context"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["scene-context.json".to_string()]);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = test_store().await;
        let err = store.get("videos/nope/01-context/media-context.json").await.unwrap_err();
        assert_eq!(
            err,
            BackendError::not_found("videos/nope/01-context/media-context.json")
        );
        assert!(!store.exists("videos/nope/x.json").await.unwrap());
    }

    #[tokio::test]
    async fn put_if_absent_refuses_existing_key() {
        let store = test_store().await;
        let key = "videos/p/01-context/audio-context.json";

        store.put_if_absent(key, b"one").await.expect("first create");
        let err = store.put_if_absent(key, b"two").await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
        assert_eq!(store.get(key).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn refused_create_leaves_no_temp_files() {
        let store = test_store().await;
        let key = "videos/p/01-context/audio-context.json";
        store.put(key, b"one").await.unwrap();
        store.put_if_absent(key, b"two").await.unwrap_err();

        let entries: Vec<_> = std::fs::read_dir(store.root().join("videos/p/01-context"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["audio-context.json".to_string()]);
    }

    #[test]
    fn abandoned_temp_file_is_removed_on_drop() {
        let dir = std::env::temp_dir().join(format!("cr_tmp_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let abandoned = dir.join(".a.json.1.tmp");
        std::fs::write(&abandoned, b"partial").unwrap();
        drop(TempFile::new(abandoned.clone()));
        assert!(!abandoned.exists());

        let published = dir.join(".b.json.2.tmp");
        std::fs::write(&published, b"done").unwrap();
        TempFile::new(published.clone()).disarm();
        assert!(published.exists());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let store = test_store().await;
        let err = store.put("../escape.json", b"x").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidKey { .. }));
    }
}
