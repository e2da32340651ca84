//! Module lifecycle configuration types
//!
//! These types control where modules are found on disk, how the store
//! catalog is reached, and the limits applied to module archives.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete module lifecycle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModulesConfig {
    /// Module directories
    #[serde(default)]
    pub paths: PathsConfig,

    /// Store catalog settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Install limits
    #[serde(default)]
    pub install: InstallConfig,
}

impl ModulesConfig {
    /// Resolve every relative path against `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };

        self.paths.bundled_legacy_modules_dir = resolve(self.paths.bundled_legacy_modules_dir);
        self.paths.bundled_modules_dir = resolve(self.paths.bundled_modules_dir);
        self.paths.store_modules_dir = resolve(self.paths.store_modules_dir);
        self.paths.custom_modules_dir = resolve(self.paths.custom_modules_dir);
        self.paths.cache_dir = resolve(self.paths.cache_dir);
        self.paths.dev_modules_dir = self.paths.dev_modules_dir.map(resolve);
        self
    }

    /// Directory set used by the module index and installer
    pub fn module_dirs(&self) -> ModuleDirs {
        ModuleDirs {
            bundled_legacy_modules_dir: self.paths.bundled_legacy_modules_dir.clone(),
            bundled_modules_dir: self.paths.bundled_modules_dir.clone(),
            custom_modules_dir: self.paths.custom_modules_dir.clone(),
            store_modules_dir: self.paths.store_modules_dir.clone(),
        }
    }
}

/// Module directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathsConfig {
    /// Legacy modules shipped with the application
    #[serde(default = "default_bundled_legacy_dir")]
    pub bundled_legacy_modules_dir: PathBuf,

    /// Modules shipped with the application
    #[serde(default = "default_bundled_dir")]
    pub bundled_modules_dir: PathBuf,

    /// Release versions installed from the store
    #[serde(default = "default_store_dir")]
    pub store_modules_dir: PathBuf,

    /// User uploaded custom builds
    #[serde(default = "default_custom_dir")]
    pub custom_modules_dir: PathBuf,

    /// Durable cache for store catalog data
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Developer module directory, loaded as dev overrides
    #[serde(default)]
    pub dev_modules_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            bundled_legacy_modules_dir: default_bundled_legacy_dir(),
            bundled_modules_dir: default_bundled_dir(),
            store_modules_dir: default_store_dir(),
            custom_modules_dir: default_custom_dir(),
            cache_dir: default_cache_dir(),
            dev_modules_dir: None,
        }
    }
}

fn default_bundled_legacy_dir() -> PathBuf {
    PathBuf::from("bundled-modules/_legacy")
}
fn default_bundled_dir() -> PathBuf {
    PathBuf::from("bundled-modules")
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("store-modules")
}
fn default_custom_dir() -> PathBuf {
    PathBuf::from("custom-modules")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

/// Store catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Base URL of the module store API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Cached data older than this is refreshed when a subscriber joins
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            stale_after_secs: default_stale_after(),
            http_timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.deckhand.dev/v1/".to_string()
}
fn default_stale_after() -> u64 {
    6 * 60 * 60 // 6 hours
}
fn default_http_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!(
        "deckhand/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Install limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallConfig {
    /// Maximum compressed archive size in bytes
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

fn default_max_archive_bytes() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

/// The directories modules are loaded from and installed into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDirs {
    pub bundled_legacy_modules_dir: PathBuf,
    pub bundled_modules_dir: PathBuf,
    pub custom_modules_dir: PathBuf,
    pub store_modules_dir: PathBuf,
}
