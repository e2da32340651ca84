//! Hierarchical module configuration loader
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Config file (~/.deckhand/modules.yaml)
//! 3. Environment variables (DECKHAND_* prefix)
//!
//! Relative paths are resolved against the config directory once all layers
//! are applied.

use crate::error::{Error, Result};
use crate::types::ModulesConfig;
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

/// Name of the user config file inside the config directory
const CONFIG_FILE_NAME: &str = "modules.yaml";

/// Module configuration loader
pub struct ModulesConfigLoader {
    /// Base directory for configuration files
    config_dir: Utf8PathBuf,
}

impl ModulesConfigLoader {
    /// Create a loader rooted at the standard config directory (~/.deckhand)
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    /// Get the standard config directory (~/.deckhand)
    fn get_config_dir() -> Result<Utf8PathBuf> {
        let home = crate::utils::get_home_dir()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| Error::invalid_config(format!("Non UTF-8 home directory: {:?}", p)))?;

        let config_dir = home.join(".deckhand");
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(config_dir)
    }

    /// Load module configuration with hierarchical precedence
    pub fn load(&self) -> Result<ModulesConfig> {
        // Start with embedded defaults
        let mut config = Self::load_embedded_config::<ModulesConfig>("modules-defaults.yaml")?;

        let config_path = self.config_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            debug!("Loading module config from {}", config_path);
            let file_config = self.load_yaml_file::<ModulesConfig>(&config_path)?;
            config = Self::merge_config(config, file_config);
        }

        config = self.apply_env_overrides(config)?;

        Ok(config.resolve_paths(self.config_dir.as_std_path()))
    }

    /// Load an embedded configuration file
    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })
    }

    /// Load a YAML file and parse it
    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Merge two configs (base is overridden by overlay)
    fn merge_config(base: ModulesConfig, overlay: ModulesConfig) -> ModulesConfig {
        let mut paths = overlay.paths;
        if paths.dev_modules_dir.is_none() {
            paths.dev_modules_dir = base.paths.dev_modules_dir;
        }

        ModulesConfig {
            paths,
            store: overlay.store,
            install: overlay.install,
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, mut config: ModulesConfig) -> Result<ModulesConfig> {
        if let Ok(val) = env::var("DECKHAND_DEV_MODULES_DIR") {
            config.paths.dev_modules_dir = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Ok(val) = env::var("DECKHAND_STORE_API_URL") {
            config.store.api_url = val;
        }

        if let Ok(val) = env::var("DECKHAND_MAX_ARCHIVE_BYTES") {
            config.install.max_archive_bytes = val.parse().map_err(|_| {
                Error::invalid_config("DECKHAND_MAX_ARCHIVE_BYTES must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("DECKHAND_STALE_AFTER_SECS") {
            config.store.stale_after_secs = val.parse().map_err(|_| {
                Error::invalid_config("DECKHAND_STALE_AFTER_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("DECKHAND_HTTP_TIMEOUT_SECS") {
            config.store.http_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("DECKHAND_HTTP_TIMEOUT_SECS must be a valid number")
            })?;
        }

        Ok(config)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
