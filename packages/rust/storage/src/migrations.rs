//! SQL migration definitions for the context index database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: context_index keyed by {contextType}#{projectId}",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per (context type, project); pk = '{contextType}#{projectId}', sk = projectId
CREATE TABLE IF NOT EXISTS context_index (
    pk            TEXT NOT NULL,
    sk            TEXT NOT NULL,
    context_type  TEXT NOT NULL,
    project_id    TEXT NOT NULL,
    s3_location   TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    ttl           INTEGER NOT NULL,
    PRIMARY KEY (pk, sk)
);

CREATE INDEX IF NOT EXISTS idx_context_index_project ON context_index(project_id);
CREATE INDEX IF NOT EXISTS idx_context_index_expiry ON context_index(expires_at_ms);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
