//! Context propagation store for ContextRelay pipelines.
//!
//! Stages hand their outputs to each other through [`ContextStore`]: payloads
//! land in a blob store under a canonical key, and a TTL-bound metadata index
//! points at them. Reads repair entries written under older key layouts.

pub mod paths;
pub mod project;
pub mod store;
pub mod validate;

pub use paths::PathResolver;
pub use project::{create_project_id, create_project_id_at, slugify};
pub use store::{ContextStore, StoreOptions, StoredContext};
pub use validate::{ValidationReport, validate_context};
