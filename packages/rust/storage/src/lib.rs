//! Metadata index for pipeline contexts.
//!
//! A [`MetadataIndex`] maps a `(contextType, projectId)` composite key to the
//! blob location holding the payload, together with creation/update
//! timestamps and an expiry. Expired entries are invisible to every read even
//! while the row still physically exists.
//!
//! Backends:
//! - [`LibsqlIndex`]: Turso embedded / libSQL file, schema managed by migrations
//! - [`MemoryIndex`]: process-local map, for tests and embedding

mod memory;
mod migrations;
mod sql;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use contextrelay_shared::{BackendResult, ContextEntry, ContextType};

pub use memory::MemoryIndex;
pub use sql::LibsqlIndex;

/// Key-value index from composite keys to blob locations with a TTL.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Upsert the entry, pointing it at `blob_location` and setting
    /// `expiresAt = now + ttl_seconds`. `createdAt` survives overwrites.
    async fn put(
        &self,
        context_type: ContextType,
        project_id: &str,
        blob_location: &str,
        ttl_seconds: u64,
    ) -> BackendResult<ContextEntry>;

    /// The entry, if present and `now < expiresAt`.
    async fn get(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> BackendResult<Option<ContextEntry>>;

    /// Point a live entry at a new blob location without touching its expiry.
    /// Returns `false` when no live entry exists.
    async fn relocate(
        &self,
        context_type: ContextType,
        project_id: &str,
        blob_location: &str,
    ) -> BackendResult<bool>;

    /// All live entries for a project, ordered by context type.
    async fn list_project(&self, project_id: &str) -> BackendResult<Vec<ContextEntry>>;

    /// Physically delete expired rows. Returns how many were removed.
    async fn purge_expired(&self) -> BackendResult<u64>;
}

/// Current time at millisecond precision, the resolution every backend persists.
pub(crate) fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// `now + ttl_seconds`, saturating at the latest representable instant.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
