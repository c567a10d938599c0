//! In-process metadata index.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use contextrelay_shared::{BackendResult, ContextEntry, ContextType};
use tokio::sync::RwLock;

use crate::{MetadataIndex, expiry_after, now_millis};

type Key = (ContextType, String);

/// Metadata index backed by a shared map. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    entries: Arc<RwLock<HashMap<Key, ContextEntry>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw entry as-is, bypassing TTL computation. Used to seed
    /// entries written under an older key layout.
    pub async fn insert_entry(&self, entry: ContextEntry) {
        self.entries
            .write()
            .await
            .insert((entry.context_type, entry.project_id.clone()), entry);
    }

    /// Number of rows held, expired ones included.
    pub async fn row_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl MetadataIndex for MemoryIndex {
    async fn put(
        &self,
        context_type: ContextType,
        project_id: &str,
        blob_location: &str,
        ttl_seconds: u64,
    ) -> BackendResult<ContextEntry> {
        let now = now_millis();
        let mut entries = self.entries.write().await;
        let created_at = entries
            .get(&(context_type, project_id.to_string()))
            .map_or(now, |existing| existing.created_at);

        let entry = ContextEntry {
            project_id: project_id.to_string(),
            context_type,
            blob_location: blob_location.to_string(),
            created_at,
            updated_at: now,
            expires_at: expiry_after(now, ttl_seconds),
        };
        entries.insert((context_type, project_id.to_string()), entry.clone());
        Ok(entry)
    }

    async fn get(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> BackendResult<Option<ContextEntry>> {
        let now = now_millis();
        Ok(self
            .entries
            .read()
            .await
            .get(&(context_type, project_id.to_string()))
            .filter(|e| e.is_live_at(now))
            .cloned())
    }

    async fn relocate(
        &self,
        context_type: ContextType,
        project_id: &str,
        blob_location: &str,
    ) -> BackendResult<bool> {
        let now = now_millis();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&(context_type, project_id.to_string())) {
            Some(entry) if entry.is_live_at(now) => {
                entry.blob_location = blob_location.to_string();
                entry.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_project(&self, project_id: &str) -> BackendResult<Vec<ContextEntry>> {
        let now = now_millis();
        let mut results: Vec<ContextEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.project_id == project_id && e.is_live_at(now))
            .cloned()
            .collect();
        results.sort_by_key(|e| e.context_type);
        Ok(results)
    }

    async fn purge_expired(&self) -> BackendResult<u64> {
        let now = now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live_at(now));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn put_get_and_overwrite() {
        let index = MemoryIndex::new();
        let first = index
            .put(ContextType::Topic, "p", "a/topic.json", 60)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = index
            .put(ContextType::Topic, "p", "b/topic.json", 60)
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        let found = index.get(ContextType::Topic, "p").await.unwrap().unwrap();
        assert_eq!(found.blob_location, "b/topic.json");
        assert_eq!(index.row_count().await, 1);
    }

    #[tokio::test]
    async fn expired_rows_are_hidden_then_purged() {
        let index = MemoryIndex::new();
        let now = now_millis();
        index
            .insert_entry(ContextEntry {
                project_id: "old".into(),
                context_type: ContextType::Scene,
                blob_location: "legacy/old/scene.json".into(),
                created_at: now,
                updated_at: now,
                expires_at: now,
            })
            .await;

        assert!(index.get(ContextType::Scene, "old").await.unwrap().is_none());
        assert!(index.list_project("old").await.unwrap().is_empty());
        assert!(!index.relocate(ContextType::Scene, "old", "x/y.json").await.unwrap());
        assert_eq!(index.purge_expired().await.unwrap(), 1);
        assert_eq!(index.row_count().await, 0);
    }
}
