//! Turso Embedded / libSQL metadata index.
//!
//! Rows live in `context_index` with primary key `{contextType}#{projectId}`
//! and sort key `{projectId}`. `ttl` holds the expiry as Unix epoch seconds for
//! backends with native expiry; reads filter on the millisecond
//! `expires_at_ms` column so visibility does not depend on garbage collection.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contextrelay_shared::{
    BackendError, BackendResult, ContextEntry, ContextRelayError, ContextType, Result,
    composite_key,
};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use crate::{MetadataIndex, expiry_after, migrations, now_millis};

const ENTRY_COLUMNS: &str =
    "project_id, context_type, s3_location, created_at, updated_at, expires_at_ms";

/// Metadata index stored in a libSQL database file.
pub struct LibsqlIndex {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlIndex {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContextRelayError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ContextRelayError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ContextRelayError::Storage(e.to_string()))?;

        let index = Self { db, conn };
        index.run_migrations().await?;
        info!(path = %path.display(), "opened libSQL context index");
        Ok(index)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ContextRelayError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Fetch a row regardless of expiry.
    #[cfg(test)]
    async fn fetch_row(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> BackendResult<Option<ContextEntry>> {
        let pk = composite_key(context_type, project_id);
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM context_index WHERE pk = ?1 AND sk = ?2"),
                params![pk.as_str(), project_id],
            )
            .await
            .map_err(sql_error)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(sql_error(e)),
        }
    }
}

#[async_trait]
impl MetadataIndex for LibsqlIndex {
    async fn put(
        &self,
        context_type: ContextType,
        project_id: &str,
        blob_location: &str,
        ttl_seconds: u64,
    ) -> BackendResult<ContextEntry> {
        let now = now_millis();
        let expires_at = expiry_after(now, ttl_seconds);
        let entry = ContextEntry {
            project_id: project_id.to_string(),
            context_type,
            blob_location: blob_location.to_string(),
            created_at: now,
            updated_at: now,
            expires_at,
        };
        let pk = entry.composite_key();
        let now_str = now.to_rfc3339();

        // created_at is preserved on conflict.
        let mut rows = self
            .conn
            .query(
                &format!(
                    "INSERT INTO context_index
                   (pk, sk, context_type, project_id, s3_location, created_at, updated_at, expires_at_ms, ttl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(pk, sk) DO UPDATE SET
                   s3_location = excluded.s3_location,
                   updated_at = excluded.updated_at,
                   expires_at_ms = excluded.expires_at_ms,
                   ttl = excluded.ttl
                 RETURNING {ENTRY_COLUMNS}"
                ),
                params![
                    pk.as_str(),
                    project_id,
                    context_type.as_str(),
                    project_id,
                    blob_location,
                    now_str.as_str(),
                    now_str.as_str(),
                    expires_at.timestamp_millis(),
                    entry.ttl_epoch(),
                ],
            )
            .await
            .map_err(sql_error)?;

        let stored = match rows.next().await {
            Ok(Some(row)) => row_to_entry(&row)?,
            Ok(None) => {
                return Err(BackendError::unavailable(format!(
                    "upsert of {pk} returned no row"
                )));
            }
            Err(e) => return Err(sql_error(e)),
        };

        debug!(%pk, blob_location, ttl_seconds, "upserted index entry");
        Ok(stored)
    }

    async fn get(
        &self,
        context_type: ContextType,
        project_id: &str,
    ) -> BackendResult<Option<ContextEntry>> {
        let pk = composite_key(context_type, project_id);
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM context_index
                     WHERE pk = ?1 AND sk = ?2 AND expires_at_ms > ?3"
                ),
                params![pk.as_str(), project_id, now_millis().timestamp_millis()],
            )
            .await
            .map_err(sql_error)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(sql_error(e)),
        }
    }

    async fn relocate(
        &self,
        context_type: ContextType,
        project_id: &str,
        blob_location: &str,
    ) -> BackendResult<bool> {
        let now = now_millis();
        let pk = composite_key(context_type, project_id);
        let changed = self
            .conn
            .execute(
                "UPDATE context_index SET s3_location = ?1, updated_at = ?2
                 WHERE pk = ?3 AND sk = ?4 AND expires_at_ms > ?5",
                params![
                    blob_location,
                    now.to_rfc3339(),
                    pk.as_str(),
                    project_id,
                    now.timestamp_millis(),
                ],
            )
            .await
            .map_err(sql_error)?;

        debug!(%pk, blob_location, changed, "relocated index entry");
        Ok(changed > 0)
    }

    async fn list_project(&self, project_id: &str) -> BackendResult<Vec<ContextEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM context_index
                     WHERE sk = ?1 AND expires_at_ms > ?2"
                ),
                params![project_id, now_millis().timestamp_millis()],
            )
            .await
            .map_err(sql_error)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_error)? {
            results.push(row_to_entry(&row)?);
        }
        results.sort_by_key(|e| e.context_type);
        Ok(results)
    }

    async fn purge_expired(&self) -> BackendResult<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM context_index WHERE expires_at_ms <= ?1",
                params![now_millis().timestamp_millis()],
            )
            .await
            .map_err(sql_error)?;

        if removed > 0 {
            info!(removed, "purged expired index entries");
        }
        Ok(removed)
    }
}

fn sql_error(e: libsql::Error) -> BackendError {
    BackendError::unavailable(e)
}

/// Convert a database row to a [`ContextEntry`].
fn row_to_entry(row: &libsql::Row) -> BackendResult<ContextEntry> {
    let context_type: String = row.get(1).map_err(sql_error)?;
    Ok(ContextEntry {
        project_id: row.get::<String>(0).map_err(sql_error)?,
        context_type: context_type
            .parse()
            .map_err(|e: ContextRelayError| BackendError::unavailable(e))?,
        blob_location: row.get::<String>(2).map_err(sql_error)?,
        created_at: parse_timestamp(&row.get::<String>(3).map_err(sql_error)?)?,
        updated_at: parse_timestamp(&row.get::<String>(4).map_err(sql_error)?)?,
        expires_at: {
            let ms: i64 = row.get(5).map_err(sql_error)?;
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| BackendError::unavailable(format!("invalid expiry: {ms}")))?
        },
    })
}

fn parse_timestamp(s: &str) -> BackendResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BackendError::unavailable(format!("invalid date: {e}")))
}
