//! Error types for ContextRelay.
//!
//! The public store surfaces [`ContextRelayError`]. Storage backends return the
//! narrower [`BackendError`] so the store can tell definitive absence apart
//! from transient faults without inspecting messages.

use std::path::PathBuf;

/// Top-level error type for all ContextRelay operations.
#[derive(Debug, thiserror::Error)]
pub enum ContextRelayError {
    /// Malformed input: empty project id, unknown context type, bad payload.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Neither the canonical nor the legacy location holds the context,
    /// or the index entry is absent or expired.
    #[error("no {context_type} context for project '{project_id}'")]
    NotFound {
        context_type: String,
        project_id: String,
    },

    /// A read from the blob store or metadata index failed or timed out.
    #[error("storage read failed ({operation}) for {context_type}/{project_id}: {message}")]
    StorageRead {
        context_type: String,
        project_id: String,
        operation: &'static str,
        message: String,
    },

    /// A write to the blob store failed or timed out.
    #[error("storage write failed ({operation}) for {context_type}/{project_id}: {message}")]
    StorageWrite {
        context_type: String,
        project_id: String,
        operation: &'static str,
        message: String,
    },

    /// The blob was written but the index upsert failed. The blob at
    /// `blob_location` is left in place.
    #[error(
        "index write failed for {context_type}/{project_id} after blob write to {blob_location}: {message}"
    )]
    IndexWrite {
        context_type: String,
        project_id: String,
        blob_location: String,
        message: String,
    },

    /// The stored payload exists but cannot be decoded. Retrying returns the
    /// same bytes, so this is never retryable.
    #[error("corrupt {context_type} context for project '{project_id}' at {key}: {message}")]
    Corrupt {
        context_type: String,
        project_id: String,
        key: String,
        message: String,
    },

    /// A backend could not be opened or migrated.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContextRelayError>;

impl ContextRelayError {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the context simply does not exist (yet).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for transient infrastructure failures a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageRead { .. } | Self::StorageWrite { .. } | Self::IndexWrite { .. }
        )
    }
}

/// Error returned by blob store and metadata index backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The object or row definitively does not exist.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// A conditional create found the key already present.
    #[error("already exists: {key}")]
    AlreadyExists { key: String },

    /// The key cannot be mapped onto the backend.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Connectivity, throttling, I/O or any other infrastructure fault.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

impl BackendError {
    /// Create a not-found error for a key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an unavailable error from any displayable message.
    pub fn unavailable(msg: impl std::fmt::Display) -> Self {
        Self::Unavailable(msg.to_string())
    }
}
