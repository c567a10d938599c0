//! Core domain types for pipeline context entries.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ContextRelayError, Result};

const HOUR: u64 = 60 * 60;

// ---------------------------------------------------------------------------
// ContextType
// ---------------------------------------------------------------------------

/// The pipeline stage that produced a context document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Topic,
    Scene,
    Media,
    Audio,
    Assembly,
    Publish,
    Summary,
}

impl ContextType {
    /// Every recognized context type, in pipeline order.
    pub const ALL: [ContextType; 7] = [
        ContextType::Topic,
        ContextType::Scene,
        ContextType::Media,
        ContextType::Audio,
        ContextType::Assembly,
        ContextType::Publish,
        ContextType::Summary,
    ];

    /// Wire name used in storage keys and index rows.
    pub fn as_str(self) -> &'static str {
        match self {
            ContextType::Topic => "topic",
            ContextType::Scene => "scene",
            ContextType::Media => "media",
            ContextType::Audio => "audio",
            ContextType::Assembly => "assembly",
            ContextType::Publish => "publish",
            ContextType::Summary => "summary",
        }
    }

    /// Built-in time-to-live when neither the caller nor the config sets one.
    pub fn default_ttl_seconds(self) -> u64 {
        match self {
            ContextType::Topic => 48 * HOUR,
            ContextType::Scene => 24 * HOUR,
            ContextType::Media => 12 * HOUR,
            ContextType::Audio => 12 * HOUR,
            ContextType::Assembly => 6 * HOUR,
            ContextType::Publish => 24 * HOUR,
            ContextType::Summary => 72 * HOUR,
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContextType {
    type Err = ContextRelayError;

    fn from_str(s: &str) -> Result<Self> {
        ContextType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ContextRelayError::validation(format!("unrecognized context type '{s}'"))
            })
    }
}

// ---------------------------------------------------------------------------
// ProjectId
// ---------------------------------------------------------------------------

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_]{2,}").expect("static regex"));

/// A normalized pipeline-run identifier, safe to embed in a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Normalize and validate a raw project id.
    ///
    /// Fails when the normalized id is empty or contains `/`, `\` or `..`.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = Self::normalize(raw);
        if normalized.is_empty() {
            return Err(ContextRelayError::validation("project id must not be empty"));
        }
        if normalized.contains(['/', '\\']) || normalized.contains("..") {
            return Err(ContextRelayError::validation(format!(
                "project id '{normalized}' contains a path separator or '..'"
            )));
        }
        Ok(Self(normalized))
    }

    /// Trim surrounding whitespace and collapse each run of `-`/`_` into its
    /// first character. Applying it twice is the same as applying it once.
    pub fn normalize(raw: &str) -> String {
        SEPARATOR_RUN
            .replace_all(raw.trim(), |caps: &regex::Captures<'_>| caps[0][..1].to_string())
            .into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = ContextRelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ContextEntry
// ---------------------------------------------------------------------------

/// Index primary key for a `(contextType, projectId)` pair.
pub fn composite_key(context_type: ContextType, project_id: &str) -> String {
    format!("{context_type}#{project_id}")
}

/// One row of the metadata index: where a context lives and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Normalized project id (also the index sort key).
    pub project_id: String,
    /// Stage that produced the context.
    pub context_type: ContextType,
    /// Blob store key holding the payload.
    pub blob_location: String,
    /// First successful store.
    pub created_at: DateTime<Utc>,
    /// Last store or repair.
    pub updated_at: DateTime<Utc>,
    /// The entry is treated as absent from this instant on.
    pub expires_at: DateTime<Utc>,
}

impl ContextEntry {
    pub fn composite_key(&self) -> String {
        composite_key(self.context_type, &self.project_id)
    }

    /// Expiry as Unix epoch seconds, rounded up, for backends with native TTL.
    pub fn ttl_epoch(&self) -> i64 {
        let secs = self.expires_at.timestamp();
        if self.expires_at.timestamp_subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
