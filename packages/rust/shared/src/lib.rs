//! Shared types, error model, and configuration for ContextRelay.
//!
//! This crate is the foundation depended on by all other ContextRelay crates.
//! It provides:
//! - [`ContextRelayError`] and [`BackendError`]: the error taxonomy
//! - Domain types ([`ContextType`], [`ProjectId`], [`ContextEntry`])
//! - Configuration ([`AppConfig`], [`StoreConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BlobConfig, IndexConfig, LayoutConfig, StoreConfig, TimeoutsConfig, TtlConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_config,
};
pub use error::{BackendError, BackendResult, ContextRelayError, Result};
pub use types::{ContextEntry, ContextType, ProjectId, composite_key};
