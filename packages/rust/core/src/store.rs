//! The context store: durable hand-off of stage outputs between pipeline stages.
//!
//! A write puts the payload at the canonical key, then points the index entry
//! at it with a TTL. A read resolves the index entry, tries the canonical key,
//! and only when that object is missing tries the location recorded in the
//! index. A hit there is copied to the canonical key and the index is
//! repointed (a self-healing read).
//!
//! The store holds no state of its own and never caches; every call goes to
//! the injected backends, each under a deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use contextrelay_blob::{BlobStore, FsBlobStore};
use contextrelay_shared::{
    AppConfig, BackendError, BackendResult, ContextEntry, ContextRelayError, ContextType,
    ProjectId, Result, StoreConfig, expand_home, validate_config,
};
use contextrelay_storage::{LibsqlIndex, MetadataIndex};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::paths::PathResolver;
use crate::validate::validate_context;

/// Per-call options for [`ContextStore::store_context`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Overrides the configured TTL for this context type.
    pub ttl_seconds: Option<u64>,
    /// Overrides the configured write deadline for each backend call.
    pub timeout: Option<Duration>,
    /// Fields that must be present and truthy in the payload.
    pub required_fields: Vec<String>,
}

impl StoreOptions {
    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn require<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Result of a successful store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContext {
    /// Normalized project id the context was stored under.
    pub project_id: String,
    /// Canonical blob key.
    pub blob_location: String,
    /// When the index entry stops being visible.
    pub expires_at: DateTime<Utc>,
    /// Hex SHA-256 of the stored bytes.
    pub sha256: String,
    pub size_bytes: usize,
}

/// Stores and retrieves pipeline contexts over an injected blob store and
/// metadata index. Cheap to clone; clones share the backends.
#[derive(Clone)]
pub struct ContextStore {
    blob: Arc<dyn BlobStore>,
    index: Arc<dyn MetadataIndex>,
    resolver: PathResolver,
    config: StoreConfig,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContextStore {
    /// Build a store over the given backends.
    pub fn new(
        blob: Arc<dyn BlobStore>,
        index: Arc<dyn MetadataIndex>,
        config: StoreConfig,
    ) -> Self {
        Self {
            blob,
            index,
            resolver: PathResolver::from(&config),
            config,
        }
    }

    /// Open the libSQL index and filesystem blob store named in `config`.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        validate_config(config)?;
        let index_path = expand_home(&config.index.path)?;
        let blob_root = expand_home(&config.blob.root)?;

        let index = LibsqlIndex::open(&index_path).await?;
        let blob = FsBlobStore::open(&blob_root).await?;

        Ok(Self::new(
            Arc::new(blob),
            Arc::new(index),
            StoreConfig::from(config),
        ))
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist `payload` as the `context_type` context of `project_id`.
    ///
    /// Writes the blob at the canonical key, then upserts the index entry.
    /// Retrying with the same payload converges on the same state. When the
    /// index upsert fails after the blob write, the call fails with
    /// [`ContextRelayError::IndexWrite`] and the blob stays in place.
    #[instrument(skip_all, fields(context_type = %context_type, project_id = %project_id))]
    pub async fn store_context<T>(
        &self,
        context_type: ContextType,
        project_id: &str,
        payload: &T,
        options: &StoreOptions,
    ) -> Result<StoredContext>
    where
        T: Serialize + ?Sized,
    {
        let project_id = ProjectId::parse(project_id)?;

        let value = serde_json::to_value(payload).map_err(|e| {
            ContextRelayError::validation(format!("payload is not JSON-serializable: {e}"))
        })?;
        if !options.required_fields.is_empty() {
            let report = validate_context(&value, &options.required_fields);
            if !report.valid {
                return Err(ContextRelayError::validation(report.errors.join("; ")));
            }
        }

        let ttl_seconds = options
            .ttl_seconds
            .unwrap_or_else(|| self.config.ttl.for_type(context_type));
        if ttl_seconds == 0 {
            return Err(ContextRelayError::validation("ttl_seconds must be greater than zero"));
        }

        let bytes = serde_json::to_vec(&value).map_err(|e| {
            ContextRelayError::validation(format!("payload is not JSON-serializable: {e}"))
        })?;
        let key = self.resolver.canonical_key(&project_id, context_type);
        let limit = options.timeout.unwrap_or(self.config.write_timeout);

        let meta = with_deadline(limit, self.blob.put(&key, &bytes))
            .await
            .map_err(|e| write_error(context_type, &project_id, "blob.put", e))?;

        let entry = with_deadline(
            limit,
            self.index
                .put(context_type, project_id.as_str(), &key, ttl_seconds),
        )
        .await
        .map_err(|e| ContextRelayError::IndexWrite {
            context_type: context_type.to_string(),
            project_id: project_id.to_string(),
            blob_location: key.clone(),
            message: e.to_string(),
        })?;

        info!(
            key = %key,
            size = meta.size_bytes,
            sha256 = %meta.sha256,
            ttl_seconds,
            "stored context"
        );

        Ok(StoredContext {
            project_id: project_id.into_string(),
            blob_location: key,
            expires_at: entry.expires_at,
            sha256: meta.sha256,
            size_bytes: meta.size_bytes,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch the `context_type` context of `project_id` with the configured
    /// read deadline.
    ///
    /// Fails with [`ContextRelayError::NotFound`] when the entry is absent,
    /// expired, or its payload exists at neither location, with
    /// [`ContextRelayError::StorageRead`] on transient faults, and with
    /// [`ContextRelayError::Corrupt`] when the stored bytes are not JSON.
    pub async fn retrieve_context(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> Result<Value> {
        self.retrieve_context_with(context_type, project_id, self.config.read_timeout)
            .await
    }

    /// [`retrieve_context`](Self::retrieve_context) deserialized into `T`.
    pub async fn retrieve_context_as<T: DeserializeOwned>(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> Result<T> {
        let value = self.retrieve_context(context_type, project_id).await?;
        serde_json::from_value(value).map_err(|e| {
            ContextRelayError::validation(format!(
                "{context_type} context does not match the requested type: {e}"
            ))
        })
    }

    /// [`retrieve_context`](Self::retrieve_context) bounded by `timeout`.
    ///
    /// The budget covers the whole call, self-healing included: backend reads
    /// get whatever time remains, and a repair that runs out of budget is
    /// abandoned (the payload is still returned).
    #[instrument(skip_all, fields(context_type = %context_type, project_id = %project_id))]
    pub async fn retrieve_context_with(
        &self,
        context_type: ContextType,
        project_id: &str,
        timeout: Duration,
    ) -> Result<Value> {
        let project_id = ProjectId::parse(project_id)?;
        let deadline = Instant::now() + timeout;

        let entry = until(deadline, self.index.get(context_type, project_id.as_str()))
            .await
            .map_err(|e| read_error(context_type, &project_id, "index.get", e))?
            .ok_or_else(|| not_found(context_type, &project_id))?;

        let canonical = self.resolver.canonical_key(&project_id, context_type);

        match until(deadline, self.blob.get(&canonical)).await {
            Ok(bytes) => {
                let value = decode(context_type, &project_id, &canonical, &bytes)?;
                if entry.blob_location != canonical {
                    // Payload already lives at canonical; only the pointer is stale.
                    self.repoint(context_type, &project_id, &canonical, deadline)
                        .await;
                }
                return Ok(value);
            }
            Err(BackendError::NotFound { .. }) => {
                debug!(key = %canonical, "canonical object missing");
            }
            Err(e) => return Err(read_error(context_type, &project_id, "blob.get", e)),
        }

        let Some(legacy) = self.resolver.legacy_key(&entry, &project_id) else {
            return Err(not_found(context_type, &project_id));
        };

        let bytes = match until(deadline, self.blob.get(legacy)).await {
            Ok(bytes) => bytes,
            Err(BackendError::NotFound { .. }) => {
                return Err(not_found(context_type, &project_id));
            }
            Err(BackendError::InvalidKey { key, reason }) => {
                warn!(%key, %reason, "recorded location is not a valid key");
                return Err(not_found(context_type, &project_id));
            }
            Err(e) => return Err(read_error(context_type, &project_id, "blob.get_legacy", e)),
        };

        let value = decode(context_type, &project_id, legacy, &bytes)?;
        self.migrate_legacy(context_type, &project_id, legacy, &canonical, &bytes, deadline)
            .await;
        Ok(value)
    }

    /// The live index entry for `(context_type, project_id)`, without touching the blob.
    pub async fn describe_context(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> Result<Option<ContextEntry>> {
        let project_id = ProjectId::parse(project_id)?;
        with_deadline(
            self.config.read_timeout,
            self.index.get(context_type, project_id.as_str()),
        )
        .await
        .map_err(|e| read_error(context_type, &project_id, "index.get", e))
    }

    /// All live entries of a project, in pipeline order.
    pub async fn list_project_contexts(&self, project_id: &str) -> Result<Vec<ContextEntry>> {
        let project_id = ProjectId::parse(project_id)?;
        with_deadline(
            self.config.read_timeout,
            self.index.list_project(project_id.as_str()),
        )
        .await
        .map_err(|e| ContextRelayError::StorageRead {
            context_type: "*".to_string(),
            project_id: project_id.to_string(),
            operation: "index.list_project",
            message: e.to_string(),
        })
    }

    /// Physically remove expired index rows. Blobs are left untouched.
    pub async fn purge_expired(&self) -> Result<u64> {
        with_deadline(self.config.write_timeout, self.index.purge_expired())
            .await
            .map_err(|e| ContextRelayError::Storage(format!("purge failed: {e}")))
    }

    // -----------------------------------------------------------------------
    // Self-healing (best effort: failures are logged, never returned)
    // -----------------------------------------------------------------------

    /// Copy a payload found at `legacy` to `canonical`, then repoint the index.
    ///
    /// The copy is create-only: if a concurrent store already wrote the
    /// canonical key, its content wins and only the pointer is updated. The
    /// index is never pointed at `canonical` unless an object exists there.
    /// Both steps share the caller's `deadline`.
    async fn migrate_legacy(
        &self,
        context_type: ContextType,
        project_id: &ProjectId,
        legacy: &str,
        canonical: &str,
        bytes: &[u8],
        deadline: Instant,
    ) {
        match until(deadline, self.blob.put_if_absent(canonical, bytes)).await {
            Ok(meta) => {
                info!(from = %legacy, to = %canonical, size = meta.size_bytes, "copied legacy context to canonical key");
            }
            Err(BackendError::AlreadyExists { .. }) => {
                debug!(key = %canonical, "canonical object appeared concurrently, keeping it");
            }
            Err(e) => {
                warn!(
                    %context_type,
                    %project_id,
                    from = %legacy,
                    to = %canonical,
                    error = %e,
                    "legacy context copy failed"
                );
                return;
            }
        }

        self.repoint(context_type, project_id, canonical, deadline)
            .await;
    }

    /// Point the index entry at `canonical`, keeping its expiry.
    async fn repoint(
        &self,
        context_type: ContextType,
        project_id: &ProjectId,
        canonical: &str,
        deadline: Instant,
    ) {
        match until(
            deadline,
            self.index
                .relocate(context_type, project_id.as_str(), canonical),
        )
        .await
        {
            Ok(true) => info!(%context_type, %project_id, to = %canonical, "index repointed to canonical key"),
            Ok(false) => debug!(%context_type, %project_id, "entry expired before repoint"),
            Err(e) => warn!(%context_type, %project_id, error = %e, "index repoint failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a backend call under `limit`; expiry becomes [`BackendError::Unavailable`].
async fn with_deadline<T, F>(limit: Duration, call: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(BackendError::unavailable(format!("timed out after {limit:?}"))))
}

/// Run a backend call that must finish by `deadline`.
async fn until<T, F>(deadline: Instant, call: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    tokio::time::timeout_at(deadline, call)
        .await
        .unwrap_or_else(|_| Err(BackendError::unavailable("timed out at caller deadline")))
}

fn not_found(context_type: ContextType, project_id: &ProjectId) -> ContextRelayError {
    ContextRelayError::NotFound {
        context_type: context_type.to_string(),
        project_id: project_id.to_string(),
    }
}

fn read_error(
    context_type: ContextType,
    project_id: &ProjectId,
    operation: &'static str,
    e: BackendError,
) -> ContextRelayError {
    match e {
        BackendError::InvalidKey { key, reason } => {
            ContextRelayError::validation(format!("invalid key '{key}': {reason}"))
        }
        other => ContextRelayError::StorageRead {
            context_type: context_type.to_string(),
            project_id: project_id.to_string(),
            operation,
            message: other.to_string(),
        },
    }
}

fn write_error(
    context_type: ContextType,
    project_id: &ProjectId,
    operation: &'static str,
    e: BackendError,
) -> ContextRelayError {
    match e {
        BackendError::InvalidKey { key, reason } => {
            ContextRelayError::validation(format!("invalid key '{key}': {reason}"))
        }
        other => ContextRelayError::StorageWrite {
            context_type: context_type.to_string(),
            project_id: project_id.to_string(),
            operation,
            message: other.to_string(),
        },
    }
}

fn decode(
    context_type: ContextType,
    project_id: &ProjectId,
    key: &str,
    bytes: &[u8],
) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| ContextRelayError::Corrupt {
        context_type: context_type.to_string(),
        project_id: project_id.to_string(),
        key: key.to_string(),
        message: format!("stored payload is not valid JSON: {e}"),
    })
}
