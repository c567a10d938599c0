//! Application configuration for ContextRelay.
//!
//! User config lives at `~/.contextrelay/contextrelay.toml`.
//! Values passed explicitly to the store override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ContextRelayError, Result};
use crate::types::ContextType;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contextrelay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contextrelay";

// ---------------------------------------------------------------------------
// Config structs (matching contextrelay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blob key layout.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Per-call backend timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Per-context-type TTLs in seconds.
    #[serde(default)]
    pub ttl: TtlConfig,

    /// Metadata index backend.
    #[serde(default)]
    pub index: IndexConfig,

    /// Blob store backend.
    #[serde(default)]
    pub blob: BlobConfig,
}

/// `[layout]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Leading key segment shared by every project.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Directory under each project that holds context documents.
    #[serde(default = "default_context_dir")]
    pub context_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            context_dir: default_context_dir(),
        }
    }
}

fn default_namespace() -> String {
    "videos".into()
}
fn default_context_dir() -> String {
    "01-context".into()
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_read_ms")]
    pub read_ms: u64,

    #[serde(default = "default_write_ms")]
    pub write_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            read_ms: default_read_ms(),
            write_ms: default_write_ms(),
        }
    }
}

fn default_read_ms() -> u64 {
    5_000
}
fn default_write_ms() -> u64 {
    10_000
}

/// `[ttl]` section. Missing keys fall back to [`ContextType::default_ttl_seconds`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_ttl_topic")]
    pub topic: u64,
    #[serde(default = "default_ttl_scene")]
    pub scene: u64,
    #[serde(default = "default_ttl_media")]
    pub media: u64,
    #[serde(default = "default_ttl_audio")]
    pub audio: u64,
    #[serde(default = "default_ttl_assembly")]
    pub assembly: u64,
    #[serde(default = "default_ttl_publish")]
    pub publish: u64,
    #[serde(default = "default_ttl_summary")]
    pub summary: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            topic: default_ttl_topic(),
            scene: default_ttl_scene(),
            media: default_ttl_media(),
            audio: default_ttl_audio(),
            assembly: default_ttl_assembly(),
            publish: default_ttl_publish(),
            summary: default_ttl_summary(),
        }
    }
}

impl TtlConfig {
    /// TTL in seconds configured for `context_type`.
    pub fn for_type(&self, context_type: ContextType) -> u64 {
        match context_type {
            ContextType::Topic => self.topic,
            ContextType::Scene => self.scene,
            ContextType::Media => self.media,
            ContextType::Audio => self.audio,
            ContextType::Assembly => self.assembly,
            ContextType::Publish => self.publish,
            ContextType::Summary => self.summary,
        }
    }
}

fn default_ttl_topic() -> u64 {
    ContextType::Topic.default_ttl_seconds()
}
fn default_ttl_scene() -> u64 {
    ContextType::Scene.default_ttl_seconds()
}
fn default_ttl_media() -> u64 {
    ContextType::Media.default_ttl_seconds()
}
fn default_ttl_audio() -> u64 {
    ContextType::Audio.default_ttl_seconds()
}
fn default_ttl_assembly() -> u64 {
    ContextType::Assembly.default_ttl_seconds()
}
fn default_ttl_publish() -> u64 {
    ContextType::Publish.default_ttl_seconds()
}
fn default_ttl_summary() -> u64 {
    ContextType::Summary.default_ttl_seconds()
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// libSQL database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_index_path")]
    pub path: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> String {
    "~/.contextrelay/index.db".into()
}

/// `[blob]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Filesystem root for blob objects. A leading `~/` expands to the home directory.
    #[serde(default = "default_blob_root")]
    pub root: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_blob_root(),
        }
    }
}

fn default_blob_root() -> String {
    "~/.contextrelay/blobs".into()
}

// ---------------------------------------------------------------------------
// Store config (runtime, derived from the config file)
// ---------------------------------------------------------------------------

/// Runtime configuration handed to the context store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Leading key segment (`videos`).
    pub namespace: String,
    /// Per-project context directory (`01-context`).
    pub context_dir: String,
    /// Deadline for each blob/index read.
    pub read_timeout: Duration,
    /// Deadline for each blob/index write.
    pub write_timeout: Duration,
    /// Default TTLs per context type.
    pub ttl: TtlConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for StoreConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            namespace: config.layout.namespace.clone(),
            context_dir: config.layout.context_dir.clone(),
            read_timeout: Duration::from_millis(config.timeouts.read_ms),
            write_timeout: Duration::from_millis(config.timeouts.write_ms),
            ttl: config.ttl.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contextrelay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContextRelayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contextrelay/contextrelay.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContextRelayError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ContextRelayError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContextRelayError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContextRelayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContextRelayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs that would produce malformed keys or zero deadlines.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    for (name, segment) in [
        ("layout.namespace", &config.layout.namespace),
        ("layout.context_dir", &config.layout.context_dir),
    ] {
        if segment.is_empty() || segment.contains(['/', '\\']) || segment == ".." {
            return Err(ContextRelayError::config(format!(
                "{name} must be a single non-empty key segment, got '{segment}'"
            )));
        }
    }
    if config.timeouts.read_ms == 0 || config.timeouts.write_ms == 0 {
        return Err(ContextRelayError::config("timeouts must be greater than zero"));
    }
    if let Some(t) = ContextType::ALL
        .into_iter()
        .find(|t| config.ttl.for_type(*t) == 0)
    {
        return Err(ContextRelayError::config(format!(
            "ttl.{t} must be greater than zero"
        )));
    }
    Ok(())
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ContextRelayError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("namespace"));
        assert!(toml_str.contains("01-context"));
        assert!(toml_str.contains("assembly = 21600"));
    }

    #[test]
    fn partial_ttl_section_keeps_other_defaults() {
        let toml_str = r#"
[ttl]
assembly = 60

[timeouts]
read_ms = 250
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.ttl.for_type(ContextType::Assembly), 60);
        assert_eq!(config.ttl.for_type(ContextType::Topic), 172_800);
        assert_eq!(config.timeouts.read_ms, 250);
        assert_eq!(config.timeouts.write_ms, 10_000);
        assert_eq!(config.layout.namespace, "videos");
    }

    #[test]
    fn store_config_from_app_config() {
        let store = StoreConfig::default();
        assert_eq!(store.namespace, "videos");
        assert_eq!(store.context_dir, "01-context");
        assert_eq!(store.read_timeout, Duration::from_secs(5));
        assert_eq!(store.write_timeout, Duration::from_secs(10));
        assert_eq!(store.ttl.for_type(ContextType::Media), 43_200);
    }

    #[test]
    fn load_config_from_file() {
        let path = std::env::temp_dir().join(format!("cr_config_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            "[layout]\nnamespace = \"shorts\"\n\n[index]\npath = \"/tmp/idx.db\"\n",
        )
        .expect("write config");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.layout.namespace, "shorts");
        assert_eq!(config.index.path, "/tmp/idx.db");
        assert_eq!(config.blob.root, "~/.contextrelay/blobs");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn invalid_layout_is_rejected() {
        let mut config = AppConfig::default();
        config.layout.namespace = "videos/extra".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("layout.namespace"));

        let mut config = AppConfig::default();
        config.ttl.scene = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ttl.scene"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home("/var/lib/relay.db").unwrap(),
            PathBuf::from("/var/lib/relay.db")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.db").unwrap(), home.join("x.db"));
        }
    }
}
