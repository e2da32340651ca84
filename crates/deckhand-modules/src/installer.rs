//! Module installer and uninstaller
//!
//! Every install runs the same pipeline:
//!
//! ```text
//! Received -> SizeChecked -> Decompressed -> ManifestExtracted -> ManifestValidated
//!          -> CollisionChecked -> Extracted -> Registered -> Done
//! ```
//!
//! Any failure aborts the pipeline and removes whatever directory it created.
//! Public operations return `Option<String>`: `None` on success, otherwise a
//! message suitable for showing to the user.

use crate::archive::{remove_dir_best_effort, ArchiveError, ModuleArchive};
use crate::cache::{CacheStore, CacheStoreExt};
use crate::download::{ArchiveDownloader, DownloadError};
use crate::index::{InstalledModuleKind, InstanceModules};
use crate::info::ModuleVersionInfo;
use crate::scanner::write_release_info;
use crate::store::ModuleStoreService;
use anyhow::{anyhow, Context};
use bytes::Bytes;
use deckhand_core::types::{module_dir_name, InstallConfig, ModuleDirs, ReleaseType};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Cache key of the user module list kept by older releases
pub const LEGACY_USER_MODULES_KEY: &str = "user-modules";

const GENERIC_FAILURE: &str = "Failed to install module";
const GENERIC_UNINSTALL_FAILURE: &str = "Failed to uninstall module";

/// Install and uninstall failures
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid data. Expected a gzipped module archive")]
    InvalidData,

    #[error("Module is too large to install (limit {limit} bytes)")]
    TooLarge { limit: u64 },

    #[error("Failed to uncompress data")]
    Decompress,

    #[error("Failed to read module archive")]
    InvalidArchive,

    #[error("Doesn't look like a valid module, missing manifest")]
    MissingManifest,

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Module {id} v{version} already exists")]
    AlreadyExists { id: String, version: String },

    #[error("Module {id} v{version} is not installed")]
    NotInstalled { id: String, version: String },

    #[error("Module {id} v{version} is not available in the store")]
    UnknownStoreVersion { id: String, version: String },

    #[error("Module {id} v{version} has no download available")]
    NoDownloadUrl { id: String, version: String },

    #[error(
        "Downloaded module does not match the request: expected {expected_id} v{expected_version}, got {id} v{version}"
    )]
    ManifestMismatch {
        expected_id: String,
        expected_version: String,
        id: String,
        version: String,
    },

    #[error("Invalid module id or version")]
    InvalidRequest,

    #[error("Failed to download module: {0}")]
    Download(DownloadError),

    #[error("Not implemented")]
    NotImplemented,

    /// Unexpected failure, never shown to the user verbatim
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl InstallError {
    fn already_exists(id: &str, version: &str) -> Self {
        Self::AlreadyExists {
            id: id.to_string(),
            version: version.to_string(),
        }
    }

    fn not_installed(id: &str, version: &str) -> Self {
        Self::NotInstalled {
            id: id.to_string(),
            version: version.to_string(),
        }
    }

    /// Whether this is an expected failure with a user-facing message
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl From<DownloadError> for InstallError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::TooLarge { limit } => Self::TooLarge { limit },
            other => Self::Download(other),
        }
    }
}

/// Render an operation result for the caller, logging unexpected failures
fn to_boundary(result: Result<(), InstallError>, generic: &str) -> Option<String> {
    match result {
        Ok(()) => None,
        Err(InstallError::Internal(e)) => {
            error!("{}: {:#}", generic, e);
            Some(generic.to_string())
        }
        Err(e) => {
            debug!("Module operation rejected: {}", e);
            Some(e.to_string())
        }
    }
}

/// Pipeline position of an install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallStage {
    Received,
    SizeChecked,
    Decompressed,
    ManifestExtracted,
    ManifestValidated,
    CollisionChecked,
    Extracted,
    Registered,
    Done,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity a downloaded archive must declare
struct ExpectedModule<'a> {
    id: &'a str,
    version: &'a str,
    /// Channel the catalog published this release on
    release_type: ReleaseType,
}

/// Installs module archives into the store and custom roots
pub struct InstalledModulesManager {
    modules: Arc<InstanceModules>,
    store: Arc<ModuleStoreService>,
    downloader: ArchiveDownloader,
    store_modules_dir: PathBuf,
    custom_modules_dir: PathBuf,
    max_archive_bytes: u64,
    legacy_user_modules: Vec<serde_json::Value>,
}

impl InstalledModulesManager {
    pub fn new(
        modules: Arc<InstanceModules>,
        store: Arc<ModuleStoreService>,
        cache: &dyn CacheStore,
        downloader: ArchiveDownloader,
        dirs: &ModuleDirs,
        install: &InstallConfig,
    ) -> Self {
        let legacy_user_modules = match cache.load_key::<Vec<serde_json::Value>>(LEGACY_USER_MODULES_KEY) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable legacy user module list: {:#}", e);
                Vec::new()
            }
        };
        if !legacy_user_modules.is_empty() {
            debug!(
                "Loaded {} legacy user module entries",
                legacy_user_modules.len()
            );
        }

        Self {
            modules,
            store,
            downloader,
            store_modules_dir: dirs.store_modules_dir.clone(),
            custom_modules_dir: dirs.custom_modules_dir.clone(),
            max_archive_bytes: install.max_archive_bytes,
            legacy_user_modules,
        }
    }

    /// Create the install roots
    pub async fn init(&self) -> anyhow::Result<()> {
        for dir in [&self.store_modules_dir, &self.custom_modules_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create module directory: {:?}", dir))?;
        }
        Ok(())
    }

    /// Directory store releases are installed into
    pub fn store_modules_dir(&self) -> &Path {
        &self.store_modules_dir
    }

    /// Directory custom builds are installed into
    pub fn custom_modules_dir(&self) -> &Path {
        &self.custom_modules_dir
    }

    /// Entries of the pre-store user module list, carried but unused
    pub fn legacy_user_modules(&self) -> &[serde_json::Value] {
        &self.legacy_user_modules
    }

    /// Install an uploaded archive as a custom module
    pub async fn install_custom_module(&self, data: Bytes) -> Option<String> {
        to_boundary(
            self.try_install_custom_module(data).await.map(|_| ()),
            GENERIC_FAILURE,
        )
    }

    async fn try_install_custom_module(&self, data: Bytes) -> Result<ModuleVersionInfo, InstallError> {
        stage("custom", InstallStage::Received);
        if data.is_empty() {
            return Err(InstallError::InvalidData);
        }
        if data.len() as u64 > self.max_archive_bytes {
            return Err(InstallError::TooLarge {
                limit: self.max_archive_bytes,
            });
        }
        stage("custom", InstallStage::SizeChecked);

        self.install_archive(
            "custom",
            data,
            &self.custom_modules_dir,
            InstalledModuleKind::Custom,
            None,
        )
        .await
    }

    /// Remove a custom module version
    pub async fn uninstall_custom_module(&self, module_id: &str, version_id: &str) -> Option<String> {
        to_boundary(
            self.uninstall(
                &self.custom_modules_dir,
                InstalledModuleKind::Custom,
                module_id,
                version_id,
            )
            .await,
            GENERIC_UNINSTALL_FAILURE,
        )
    }

    /// Download and install a release from the store
    pub async fn install_store_module(&self, module_id: &str, version_id: &str) -> Option<String> {
        to_boundary(
            self.try_install_store_module(module_id, version_id)
                .await
                .map(|_| ()),
            GENERIC_FAILURE,
        )
    }

    async fn try_install_store_module(
        &self,
        module_id: &str,
        version_id: &str,
    ) -> Result<ModuleVersionInfo, InstallError> {
        let label = format!("{}@{}", module_id, version_id);
        stage(&label, InstallStage::Received);
        check_path_safe(module_id, version_id)?;

        let module_dir = self
            .store_modules_dir
            .join(module_dir_name(module_id, version_id));
        if path_exists(&module_dir).await {
            return Err(InstallError::already_exists(module_id, version_id));
        }

        let entry = self
            .store
            .get_cached_module_version_info(module_id, version_id)
            .await
            .ok_or_else(|| InstallError::UnknownStoreVersion {
                id: module_id.to_string(),
                version: version_id.to_string(),
            })?;
        let release_type = if entry.is_prerelease {
            ReleaseType::Prerelease
        } else {
            ReleaseType::Stable
        };
        let tar_url = entry
            .tar_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| InstallError::NoDownloadUrl {
                id: module_id.to_string(),
                version: version_id.to_string(),
            })?;

        info!("Downloading {} from {}", label, tar_url);
        let data = self
            .downloader
            .download_capped(&tar_url, self.max_archive_bytes)
            .await?;
        stage(&label, InstallStage::SizeChecked);

        self.install_archive(
            &label,
            data,
            &self.store_modules_dir,
            InstalledModuleKind::Store,
            Some(ExpectedModule {
                id: module_id,
                version: version_id,
                release_type,
            }),
        )
        .await
    }

    /// Install the newest store release of a module
    pub async fn install_store_module_latest(&self, module_id: &str) -> Option<String> {
        debug!("Install of latest {} requested", module_id);
        to_boundary(Err(InstallError::NotImplemented), GENERIC_FAILURE)
    }

    /// Remove a store release
    pub async fn uninstall_store_module(&self, module_id: &str, version_id: &str) -> Option<String> {
        to_boundary(
            self.uninstall(
                &self.store_modules_dir,
                InstalledModuleKind::Store,
                module_id,
                version_id,
            )
            .await,
            GENERIC_UNINSTALL_FAILURE,
        )
    }

    /// Shared tail of the install pipeline, from decompression to registration
    async fn install_archive(
        &self,
        label: &str,
        data: Bytes,
        root: &Path,
        kind: InstalledModuleKind,
        expected: Option<ExpectedModule<'_>>,
    ) -> Result<ModuleVersionInfo, InstallError> {
        let archive = ModuleArchive::decompress(data).await.map_err(|e| match e {
            ArchiveError::Decompress(_) => InstallError::Decompress,
            other => InstallError::Internal(anyhow!(other)),
        })?;
        stage(label, InstallStage::Decompressed);

        let manifest = archive
            .read_manifest()
            .await
            .map_err(|e| match e {
                ArchiveError::InvalidManifest(e) => InstallError::InvalidManifest(e.to_string()),
                ArchiveError::Tar(_) => InstallError::InvalidArchive,
                other => InstallError::Internal(anyhow!(other)),
            })?
            .ok_or(InstallError::MissingManifest)?;
        stage(label, InstallStage::ManifestExtracted);

        if let Some(expected) = &expected {
            if manifest.id != expected.id || manifest.version != expected.version {
                return Err(InstallError::ManifestMismatch {
                    expected_id: expected.id.to_string(),
                    expected_version: expected.version.to_string(),
                    id: manifest.id,
                    version: manifest.version,
                });
            }
        }
        stage(label, InstallStage::ManifestValidated);

        let module_dir = root.join(manifest.dir_name());
        if path_exists(&module_dir).await {
            return Err(InstallError::already_exists(&manifest.id, &manifest.version));
        }
        stage(label, InstallStage::CollisionChecked);

        archive
            .extract_to(&module_dir)
            .await
            .with_context(|| format!("Failed to extract module to {:?}", module_dir))?;
        stage(label, InstallStage::Extracted);

        let release_type = expected.map(|e| e.release_type);
        if let Some(release_type) = release_type {
            if let Err(e) = write_release_info(&module_dir, release_type).await {
                warn!("Release channel of {} will not survive a restart: {:#}", label, e);
            }
        }

        let version = match self
            .modules
            .register_installed_module(&module_dir, kind, release_type)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                remove_dir_best_effort(&module_dir).await;
                return Err(InstallError::Internal(
                    e.context(format!("Failed to register module {}", manifest.dir_name())),
                ));
            }
        };
        stage(label, InstallStage::Registered);

        info!(
            "Installed {:?} module {} v{} into {:?}",
            kind, manifest.id, manifest.version, module_dir
        );
        stage(label, InstallStage::Done);
        Ok(version)
    }

    async fn uninstall(
        &self,
        root: &Path,
        kind: InstalledModuleKind,
        module_id: &str,
        version_id: &str,
    ) -> Result<(), InstallError> {
        check_path_safe(module_id, version_id)?;

        let module_dir = root.join(module_dir_name(module_id, version_id));
        if !path_exists(&module_dir).await {
            return Err(InstallError::not_installed(module_id, version_id));
        }

        if self
            .modules
            .uninstall_module(module_id, kind, version_id)
            .await
            .is_none()
        {
            debug!(
                "{} v{} was on disk but not registered",
                module_id, version_id
            );
        }

        remove_dir_best_effort(&module_dir).await;
        info!("Uninstalled {:?} module {} v{}", kind, module_id, version_id);
        Ok(())
    }
}

fn stage(label: &str, stage: InstallStage) {
    debug!("Install {}: {}", label, stage);
}

/// Ids and versions become directory names, so they must stay a single path segment
fn check_path_safe(module_id: &str, version_id: &str) -> Result<(), InstallError> {
    let unsafe_part = |s: &str| s.is_empty() || s.contains(&['/', '\\'][..]) || s.contains("..");
    if unsafe_part(module_id) || unsafe_part(version_id) {
        return Err(InstallError::InvalidRequest);
    }
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
