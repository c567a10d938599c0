//! Storage key layout for context documents.
//!
//! Canonical keys have the shape
//! `<namespace>/<projectId>/<contextDir>/<contextType>-context.json`
//! (`videos/{projectId}/01-context/{contextType}-context.json` by default).
//! The only fallback ever consulted is the location recorded in the index.

use contextrelay_shared::{ContextEntry, ContextType, ProjectId, StoreConfig};

/// Computes canonical blob keys and the single legacy fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    namespace: String,
    context_dir: String,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for PathResolver {
    fn from(config: &StoreConfig) -> Self {
        Self::new(&config.namespace, &config.context_dir)
    }
}

impl PathResolver {
    pub fn new(namespace: impl Into<String>, context_dir: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            context_dir: context_dir.into(),
        }
    }

    /// Canonical key for `(project_id, context_type)`. Depends on nothing else.
    pub fn canonical_key(&self, project_id: &ProjectId, context_type: ContextType) -> String {
        format!(
            "{}/{}/{}/{}-context.json",
            self.namespace, project_id, self.context_dir, context_type
        )
    }

    /// The location recorded in `entry`, when it differs from the canonical key.
    pub fn legacy_key<'a>(&self, entry: &'a ContextEntry, project_id: &ProjectId) -> Option<&'a str> {
        let canonical = self.canonical_key(project_id, entry.context_type);
        (entry.blob_location != canonical).then_some(entry.blob_location.as_str())
    }
}
