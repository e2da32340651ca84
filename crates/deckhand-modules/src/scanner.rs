//! Module directory scanner
//!
//! Reads `companion/manifest.json` (and detects `companion/HELP.md`) for each
//! module directory found under a search root. Store installs also leave a
//! small release record next to the module so the catalog's release channel
//! survives a rescan.

use crate::info::{ModuleVersionInfo, ModuleVersionKind};
use anyhow::{Context, Result};
use deckhand_core::types::{ModuleManifest, ReleaseType, HELP_PATH, MANIFEST_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Release record written by store installs, relative to the module directory
pub const RELEASE_INFO_PATH: &str = ".deckhand-release.json";

/// Contents of [`RELEASE_INFO_PATH`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledReleaseInfo {
    pub release_type: ReleaseType,
}

/// A module directory whose manifest has been read and validated
#[derive(Debug, Clone)]
pub struct ScannedModule {
    pub base_path: PathBuf,
    pub help_path: Option<PathBuf>,
    pub manifest: ModuleManifest,
    pub is_packaged: bool,
    /// Release channel recorded at install time, if any
    pub release_type: Option<ReleaseType>,
}

impl ScannedModule {
    /// Place this module into a registry slot
    pub fn into_version(self, kind: ModuleVersionKind, is_legacy: bool) -> ModuleVersionInfo {
        let display = self.manifest.to_display(self.help_path.is_some(), is_legacy);
        ModuleVersionInfo {
            kind,
            base_path: self.base_path,
            help_path: self.help_path,
            display,
            manifest: self.manifest,
            is_packaged: self.is_packaged,
        }
    }
}

/// Stateless scanner for module directories
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleScanner;

impl ModuleScanner {
    /// Load every module directly below `search_dir`
    ///
    /// A missing search directory yields no modules. Directories that fail to
    /// load are logged and skipped.
    pub async fn load_info_for_modules_in_dir(
        &self,
        search_dir: &Path,
        is_packaged: bool,
    ) -> Vec<ScannedModule> {
        let mut entries = match tokio::fs::read_dir(search_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Module directory {:?} does not exist", search_dir);
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to read module directory {:?}: {}", search_dir, e);
                return Vec::new();
            }
        };

        let mut dirs = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.is_dir() {
                        dirs.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Error listing {:?}: {}", search_dir, e);
                    break;
                }
            }
        }
        dirs.sort();

        let mut modules = Vec::with_capacity(dirs.len());
        for dir in dirs {
            // Directories without a manifest (eg `_legacy` inside the bundle root) are not modules
            if !dir.join(MANIFEST_PATH).exists() {
                continue;
            }

            match self.load_info_for_module(&dir, is_packaged).await {
                Ok(module) => modules.push(module),
                Err(e) => warn!("Skipping module in {:?}: {:#}", dir, e),
            }
        }

        debug!("Found {} modules in {:?}", modules.len(), search_dir);
        modules
    }

    /// Load a single module directory
    pub async fn load_info_for_module(
        &self,
        module_dir: &Path,
        is_packaged: bool,
    ) -> Result<ScannedModule> {
        let manifest_path = module_dir.join(MANIFEST_PATH);
        let content = tokio::fs::read(&manifest_path)
            .await
            .with_context(|| format!("Failed to read manifest: {:?}", manifest_path))?;

        let manifest = ModuleManifest::from_slice(&content)
            .with_context(|| format!("Failed to parse manifest: {:?}", manifest_path))?;

        let help_path = module_dir.join(HELP_PATH);
        let help_path = if tokio::fs::metadata(&help_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            Some(help_path)
        } else {
            None
        };

        Ok(ScannedModule {
            base_path: module_dir.to_path_buf(),
            help_path,
            manifest,
            is_packaged,
            release_type: read_release_info(module_dir).await,
        })
    }
}

/// Record the release channel of an installed module
pub async fn write_release_info(module_dir: &Path, release_type: ReleaseType) -> Result<()> {
    let path = module_dir.join(RELEASE_INFO_PATH);
    let content = serde_json::to_vec(&InstalledReleaseInfo { release_type })?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write release info: {:?}", path))
}

async fn read_release_info(module_dir: &Path) -> Option<ReleaseType> {
    let path = module_dir.join(RELEASE_INFO_PATH);
    let content = tokio::fs::read(&path).await.ok()?;
    match serde_json::from_slice::<InstalledReleaseInfo>(&content) {
        Ok(info) => Some(info.release_type),
        Err(e) => {
            warn!("Ignoring unreadable release info {:?}: {}", path, e);
            None
        }
    }
}
