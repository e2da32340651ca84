//! # deckhand-modules
//!
//! Module lifecycle management for Deckhand:
//! - Archive ingestion (gzip + tar, manifest discovery, extraction)
//! - Per-module version registry and version selection
//! - Installed-module index with startup scanning and legacy-id redirects
//! - Custom and store installs with size limits and collision checks
//! - Store catalog cache with coalesced background refresh

pub mod archive;
pub mod cache;
pub mod download;
pub mod index;
pub mod info;
pub mod installer;
pub mod scanner;
pub mod store;
pub mod system;
pub mod usage;

pub use archive::{ArchiveError, ModuleArchive};
pub use cache::{CacheStore, CacheStoreExt, JsonFileCache};
pub use download::{ArchiveDownloader, DownloadError};
pub use index::{
    HelpAsset, HelpDescription, HelpError, InstalledModuleKind, InstanceModules, ModuleInfoUpdate,
    ScanSource,
};
pub use info::{
    ClientModuleInfo, ClientModuleVersionInfo, ClientModuleVersionInfoExt, ModuleInfo,
    ModuleVersionInfo, ModuleVersionKind,
};
pub use installer::{InstallError, InstalledModulesManager};
pub use scanner::{ModuleScanner, ScannedModule};
pub use store::{HttpStoreApi, ModuleStoreApi, ModuleStoreEvent, ModuleStoreService};
pub use system::ModuleSystem;
pub use usage::{ModuleUsageController, NoopUsageController};
