//! Installed-module index
//!
//! Owns the [`ModuleInfo`] registry for every known module id. The registry
//! is rebuilt from disk at startup by scanning an ordered list of
//! [`ScanSource`]s, then kept current as modules are installed, removed or
//! reloaded. Every change to a module's client projection is broadcast as a
//! [`ModuleInfoUpdate`].

use crate::info::{ClientModuleInfo, ModuleInfo, ModuleVersionInfo, ModuleVersionKind};
use crate::scanner::{ModuleScanner, ScannedModule};
use crate::usage::ModuleUsageController;
use anyhow::Result;
use deckhand_core::types::{ModuleDirs, ModuleVersionMode, ReleaseType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

static HELP_ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(jpe?g|gif|png|pdf|companionconfig)$").expect("help asset regex is valid")
});

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// A directory scanned at startup, listed from lowest to highest priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSource {
    /// Bundled modules kept for old configurations, flagged as legacy
    BundledLegacy(PathBuf),
    /// Modules bundled with the application
    Bundled(PathBuf),
    /// Releases installed from the store
    Store(PathBuf),
    /// User uploaded custom builds
    Custom(PathBuf),
}

impl ScanSource {
    /// Standard scan order for a set of module directories
    pub fn priority_list(dirs: &ModuleDirs) -> Vec<Self> {
        vec![
            Self::BundledLegacy(dirs.bundled_legacy_modules_dir.clone()),
            Self::Bundled(dirs.bundled_modules_dir.clone()),
            Self::Store(dirs.store_modules_dir.clone()),
            Self::Custom(dirs.custom_modules_dir.clone()),
        ]
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::BundledLegacy(p) | Self::Bundled(p) | Self::Store(p) | Self::Custom(p) => p,
        }
    }

    fn is_packaged(&self) -> bool {
        matches!(self, Self::BundledLegacy(_) | Self::Bundled(_))
    }

    /// Place a scanned module into the slot this source feeds. A recorded
    /// release channel wins over the one implied by the version string.
    fn version_for(&self, module: ScannedModule) -> ModuleVersionInfo {
        let version_id = module.manifest.version.clone();
        match self {
            Self::Custom(_) => module.into_version(ModuleVersionKind::Custom { version_id }, false),
            Self::BundledLegacy(_) | Self::Bundled(_) | Self::Store(_) => {
                let release_type = module
                    .release_type
                    .unwrap_or_else(|| ReleaseType::from_version(&version_id));
                let kind = ModuleVersionKind::Release {
                    release_type,
                    is_builtin: self.is_packaged(),
                    version_id,
                };
                module.into_version(kind, matches!(self, Self::BundledLegacy(_)))
            }
        }
    }
}

/// Which installed root a module version lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstalledModuleKind {
    Store,
    Custom,
}

/// Change to the client projection of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModuleInfoUpdate {
    Add { id: String, info: ClientModuleInfo },
    Update { id: String, info: ClientModuleInfo },
    Remove { id: String },
}

/// Help markdown for a module version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpDescription {
    pub markdown: String,
    /// Prefix that relative links in the markdown resolve against
    pub base_url: String,
}

/// A help asset resolved to a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpAsset {
    pub path: PathBuf,
    pub content_type: &'static str,
}

/// Help lookup failures
#[derive(Error, Debug)]
pub enum HelpError {
    /// The version does not exist or has no help document
    #[error("nofile")]
    NoFile,

    #[error("Failed to read help: {0}")]
    Read(#[from] std::io::Error),
}

/// Index of every module known to the application
pub struct InstanceModules {
    known_modules: RwLock<HashMap<String, ModuleInfo>>,
    last_modules_json: Mutex<HashMap<String, ClientModuleInfo>>,
    scanner: ModuleScanner,
    usage: Arc<dyn ModuleUsageController>,
    updates: broadcast::Sender<ModuleInfoUpdate>,
}

impl InstanceModules {
    pub fn new(usage: Arc<dyn ModuleUsageController>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            known_modules: RwLock::new(HashMap::new()),
            last_modules_json: Mutex::new(HashMap::new()),
            scanner: ModuleScanner,
            usage,
            updates,
        }
    }

    fn read_modules(&self) -> RwLockReadGuard<'_, HashMap<String, ModuleInfo>> {
        self.known_modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_modules(&self) -> RwLockWriteGuard<'_, HashMap<String, ModuleInfo>> {
        self.known_modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Populate the registry from disk
    ///
    /// `sources` are scanned in order, later sources replacing earlier
    /// releases with the same version id. A module found in the current
    /// bundle also replaces every release the legacy bundle provided for it.
    /// The optional dev directory is scanned last into the dev slots. Legacy
    /// redirects are resolved once everything is loaded.
    pub async fn init_modules(&self, sources: &[ScanSource], dev_modules_dir: Option<&Path>) {
        for source in sources {
            let modules = self
                .scanner
                .load_info_for_modules_in_dir(source.path(), source.is_packaged())
                .await;
            let versions: Vec<ModuleVersionInfo> =
                modules.into_iter().map(|m| source.version_for(m)).collect();
            if matches!(source, ScanSource::Bundled(_)) {
                self.drop_legacy_bundle_releases(&versions);
            }
            self.insert_versions(versions);
        }

        if let Some(dev_dir) = dev_modules_dir {
            info!("Looking for dev modules in: {:?}", dev_dir);
            let modules = self
                .scanner
                .load_info_for_modules_in_dir(dev_dir, false)
                .await;
            info!("Found {} dev modules", modules.len());

            let versions = modules
                .into_iter()
                .map(|m| m.into_version(ModuleVersionKind::Dev, false))
                .collect();
            self.insert_versions(versions);
        }

        let ids: Vec<String> = {
            let mut known = self.write_modules();
            build_redirects(&mut known);
            log_loaded_modules(&known);
            known.keys().cloned().collect()
        };

        self.publish_changes(ids);
    }

    fn drop_legacy_bundle_releases(&self, bundled: &[ModuleVersionInfo]) {
        let mut known = self.write_modules();
        for version in bundled {
            let id = &version.manifest.id;
            if let Some(info) = known.get_mut(id) {
                let dropped = info.remove_legacy_releases();
                if dropped > 0 {
                    debug!("Current bundle of {} replaces {} legacy release(s)", id, dropped);
                }
            }
        }
    }

    fn insert_versions(&self, versions: Vec<ModuleVersionInfo>) {
        let mut known = self.write_modules();
        for version in versions {
            let entry = get_or_create(&mut known, &version.manifest.id);
            match version.kind {
                ModuleVersionKind::Dev => entry.set_dev_module(Some(version)),
                ModuleVersionKind::Release { .. } => entry.add_release_version(version),
                ModuleVersionKind::Custom { .. } => entry.add_custom_version(version),
            }
        }
    }

    /// Resolve a possibly renamed module id, following at most one redirect.
    /// When several modules claim the same legacy id the first claimant in id order wins.
    pub fn verify_instance_type_is_current(&self, module_id: &str) -> String {
        let known = self.read_modules();
        known
            .get(module_id)
            .and_then(|info| info.replaced_by_ids().first())
            .cloned()
            .unwrap_or_else(|| module_id.to_string())
    }

    /// Resolve the version backing a connection
    pub fn get_module_version(
        &self,
        module_id: &str,
        mode: ModuleVersionMode,
        version_id: Option<&str>,
    ) -> Option<ModuleVersionInfo> {
        let known = self.read_modules();
        known
            .get(module_id)
            .and_then(|info| info.get_version(mode, version_id))
            .cloned()
    }

    /// Snapshot of one module's registry
    pub fn get_module_info(&self, module_id: &str) -> Option<ModuleInfo> {
        self.read_modules().get(module_id).cloned()
    }

    /// Client projection of every module that has at least one version
    pub fn get_modules_json(&self) -> HashMap<String, ClientModuleInfo> {
        let known = self.read_modules();
        known
            .iter()
            .filter_map(|(id, info)| info.to_client_summary().map(|s| (id.clone(), s)))
            .collect()
    }

    /// Current module list plus a receiver for subsequent changes.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(
        &self,
    ) -> (
        HashMap<String, ClientModuleInfo>,
        broadcast::Receiver<ModuleInfoUpdate>,
    ) {
        let receiver = self.updates.subscribe();
        (self.get_modules_json(), receiver)
    }

    /// Register a freshly extracted module directory
    ///
    /// `release_type` overrides the channel for store releases, typically the
    /// one the catalog published. Custom builds ignore it.
    pub async fn register_installed_module(
        &self,
        module_dir: &Path,
        kind: InstalledModuleKind,
        release_type: Option<ReleaseType>,
    ) -> Result<ModuleVersionInfo> {
        let mut module = self.scanner.load_info_for_module(module_dir, false).await?;
        if release_type.is_some() {
            module.release_type = release_type;
        }
        let source = match kind {
            InstalledModuleKind::Store => ScanSource::Store(module_dir.to_path_buf()),
            InstalledModuleKind::Custom => ScanSource::Custom(module_dir.to_path_buf()),
        };
        let version = source.version_for(module);
        let module_id = version.manifest.id.clone();

        info!(
            "Registered {:?} module {} v{}",
            kind, module_id, version.display.version
        );
        self.insert_versions(vec![version.clone()]);
        self.publish_changes([module_id]);

        Ok(version)
    }

    /// Remove a version from the registry and stop anything using it.
    /// Returns the removed version, `None` if it was not registered.
    pub async fn uninstall_module(
        &self,
        module_id: &str,
        kind: InstalledModuleKind,
        version_id: &str,
    ) -> Option<ModuleVersionInfo> {
        let removed = {
            let mut known = self.write_modules();
            let entry = known.get_mut(module_id)?;
            match kind {
                InstalledModuleKind::Store => entry.remove_release_version(version_id),
                InstalledModuleKind::Custom => entry.remove_custom_version(version_id),
            }
        }?;

        debug!("Unregistered {:?} module {} v{}", kind, module_id, version_id);

        if let Err(e) = self
            .usage
            .stop_usages_of_module(module_id, &removed.kind)
            .await
        {
            warn!("Failed to stop usages of {}: {:#}", module_id, e);
        }

        self.publish_changes([module_id.to_string()]);
        Some(removed)
    }

    /// Re-read a development module directory and replace its dev slot
    pub async fn reload_dev_module(&self, module_dir: &Path) -> Result<String> {
        info!("Attempting to reload module in: {:?}", module_dir);

        let module = self
            .scanner
            .load_info_for_module(module_dir, false)
            .await
            .inspect_err(|_| info!("Failed to find module in: {:?}", module_dir))?;

        let module_id = module.manifest.id.clone();
        info!(
            "Found new module \"{}\" v{} in: {:?}",
            module_id, module.manifest.version, module_dir
        );

        self.insert_versions(vec![module.into_version(ModuleVersionKind::Dev, false)]);
        self.publish_changes([module_id.clone()]);

        if let Err(e) = self.usage.reload_usages_of_module(&module_id).await {
            warn!("Failed to reload usages of {}: {:#}", module_id, e);
        }

        Ok(module_id)
    }

    /// Load the help markdown for a module version
    pub async fn get_help_for_module(
        &self,
        module_id: &str,
        mode: ModuleVersionMode,
        version_id: Option<&str>,
    ) -> std::result::Result<HelpDescription, HelpError> {
        let help_path = self
            .get_module_version(module_id, mode, version_id)
            .and_then(|v| v.help_path)
            .ok_or(HelpError::NoFile)?;

        match tokio::fs::metadata(&help_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                debug!("Help for {} is not a file: {:?}", module_id, help_path);
                return Err(HelpError::NoFile);
            }
            Err(e) => {
                debug!("Error loading help for {}: {}", module_id, e);
                return Err(HelpError::NoFile);
            }
        }

        let markdown = tokio::fs::read_to_string(&help_path).await?;
        let version_segment = if mode.is_dynamic() {
            "latest"
        } else {
            version_id.unwrap_or("latest")
        };

        Ok(HelpDescription {
            markdown,
            base_url: format!(
                "/int/help/module/{}/{}/{}",
                module_id, mode, version_segment
            ),
        })
    }

    /// Resolve a file referenced from a module's help document
    ///
    /// Only images, PDFs and `.companionconfig` files below the module's
    /// `companion/` directory are served.
    pub fn get_help_asset(
        &self,
        module_id: &str,
        mode: ModuleVersionMode,
        version_id: Option<&str>,
        file: &str,
    ) -> Option<HelpAsset> {
        if file.contains("..") || !HELP_ASSET_RE.is_match(file) {
            return None;
        }

        let relative = Path::new(file);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }

        let version = self.get_module_version(module_id, mode, version_id)?;
        version.help_path.as_ref()?;

        let path = version.base_path.join("companion").join(relative);
        if !path.is_file() {
            return None;
        }

        Some(HelpAsset {
            content_type: content_type_for(file),
            path,
        })
    }

    /// Diff the client projection of `ids` against what was last broadcast
    fn publish_changes(&self, ids: impl IntoIterator<Item = String>) {
        let summaries: Vec<(String, Option<ClientModuleInfo>)> = {
            let known = self.read_modules();
            ids.into_iter()
                .map(|id| {
                    let summary = known.get(&id).and_then(|m| m.to_client_summary());
                    (id, summary)
                })
                .collect()
        };

        let mut last = self
            .last_modules_json
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for (id, summary) in summaries {
            let previous = last.remove(&id);
            let update = match (previous, summary) {
                (None, Some(info)) => {
                    last.insert(id.clone(), info.clone());
                    Some(ModuleInfoUpdate::Add { id, info })
                }
                (Some(old), Some(info)) => {
                    last.insert(id.clone(), info.clone());
                    (old != info).then(|| ModuleInfoUpdate::Update { id, info })
                }
                (Some(_), None) => Some(ModuleInfoUpdate::Remove { id }),
                (None, None) => None,
            };

            if let Some(update) = update {
                // No receivers is fine
                let _ = self.updates.send(update);
            }
        }
    }
}

fn get_or_create<'a>(known: &'a mut HashMap<String, ModuleInfo>, id: &str) -> &'a mut ModuleInfo {
    known
        .entry(id.to_string())
        .or_insert_with(|| ModuleInfo::new(id))
}

/// Record `legacyId -> id` for every manifest, visiting modules in sorted id order
fn build_redirects(known: &mut HashMap<String, ModuleInfo>) {
    let mut ids: Vec<&String> = known.keys().collect();
    ids.sort();

    let mut redirects = Vec::new();
    for id in ids {
        let info = &known[id];
        let versions = info
            .dev_module()
            .into_iter()
            .chain(info.release_versions())
            .chain(info.custom_versions());

        for version in versions {
            for legacy_id in &version.manifest.legacy_ids {
                if legacy_id == id {
                    warn!("Module {} lists itself as a legacy id, ignoring", id);
                    continue;
                }
                redirects.push((legacy_id.clone(), id.clone()));
            }
        }
    }

    for (old_id, new_id) in redirects {
        get_or_create(known, &old_id).add_replaced_by(new_id);
    }
}

fn log_loaded_modules(known: &HashMap<String, ModuleInfo>) {
    let mut ids: Vec<&String> = known.keys().collect();
    ids.sort();

    for id in ids {
        let Some(version) = known[id].get_version(ModuleVersionMode::Stable, None) else {
            continue;
        };
        if version.is_dev() {
            info!(
                "{}@{}: {} (Overridden{})",
                version.display.id,
                version.display.version,
                version.display.name,
                if version.is_packaged { " & Packaged" } else { "" }
            );
        } else {
            debug!(
                "{}@{}: {}",
                version.display.id, version.display.version, version.display.name
            );
        }
    }
}

fn content_type_for(file: &str) -> &'static str {
    let extension = file
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::NoopUsageController;
    use deckhand_core::types::{HELP_PATH, MANIFEST_PATH};
    use tempfile::TempDir;

    fn write_module(root: &Path, id: &str, version: &str, extra: &str) -> PathBuf {
        let dir = root.join(format!("{}-{}", id, version));
        std::fs::create_dir_all(dir.join("companion")).unwrap();
        std::fs::write(
            dir.join(MANIFEST_PATH),
            format!(r#"{{"id":"{}","version":"{}"{}}}"#, id, version, extra),
        )
        .unwrap();
        dir
    }

    fn index() -> InstanceModules {
        InstanceModules::new(Arc::new(NoopUsageController))
    }

    #[tokio::test]
    async fn test_init_scan_sources() {
        let temp = TempDir::new().unwrap();
        let legacy = temp.path().join("legacy");
        let store = temp.path().join("store");
        let custom = temp.path().join("custom");
        write_module(&legacy, "old-device", "1.0.0", "");
        write_module(&store, "acme", "2.0.0", "");
        write_module(&custom, "acme", "2.0.0", "");

        let modules = index();
        modules
            .init_modules(
                &[
                    ScanSource::BundledLegacy(legacy),
                    ScanSource::Store(store),
                    ScanSource::Custom(custom),
                ],
                None,
            )
            .await;

        let old = modules
            .get_module_version("old-device", ModuleVersionMode::Stable, None)
            .unwrap();
        assert!(old.display.is_legacy);
        assert!(old.is_packaged);

        let release = modules
            .get_module_version("acme", ModuleVersionMode::SpecificVersion, Some("2.0.0"))
            .unwrap();
        assert!(!release.is_packaged);
        assert!(modules
            .get_module_version("acme", ModuleVersionMode::Custom, Some("2.0.0"))
            .is_some());
    }

    #[tokio::test]
    async fn test_redirect_single_hop() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "b", "1.0.0", r#","legacyIds":["a"]"#);
        write_module(temp.path(), "c", "1.0.0", r#","legacyIds":["b","c"]"#);

        let modules = index();
        modules
            .init_modules(&[ScanSource::Bundled(temp.path().to_path_buf())], None)
            .await;

        assert_eq!(modules.verify_instance_type_is_current("a"), "b");
        assert_eq!(modules.verify_instance_type_is_current("b"), "c");
        // Self reference is ignored
        assert_eq!(modules.verify_instance_type_is_current("c"), "c");
        assert_eq!(modules.verify_instance_type_is_current("unknown"), "unknown");
        // Legacy id shells are not listed
        assert!(!modules.get_modules_json().contains_key("a"));
    }

    #[tokio::test]
    async fn test_register_and_uninstall_broadcasts() {
        let temp = TempDir::new().unwrap();
        let dir = write_module(temp.path(), "acme", "1.0.0", "");

        let modules = index();
        let (initial, mut updates) = modules.subscribe();
        assert!(initial.is_empty());

        modules
            .register_installed_module(&dir, InstalledModuleKind::Custom, None)
            .await
            .unwrap();
        assert!(matches!(
            updates.recv().await.unwrap(),
            ModuleInfoUpdate::Add { id, .. } if id == "acme"
        ));

        let removed = modules
            .uninstall_module("acme", InstalledModuleKind::Custom, "1.0.0")
            .await;
        assert!(removed.is_some());
        assert!(matches!(
            updates.recv().await.unwrap(),
            ModuleInfoUpdate::Remove { id } if id == "acme"
        ));

        // Registry shell stays but reports nothing
        assert!(modules.get_module_info("acme").unwrap().is_empty());
        assert!(modules
            .uninstall_module("acme", InstalledModuleKind::Custom, "1.0.0")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_reload_dev_module() {
        let temp = TempDir::new().unwrap();
        let release_root = temp.path().join("bundled");
        write_module(&release_root, "acme", "1.0.0", "");
        let dev_dir = write_module(&temp.path().join("dev"), "acme", "9.0.0", "");

        let modules = index();
        modules
            .init_modules(&[ScanSource::Bundled(release_root)], None)
            .await;
        let (_, mut updates) = modules.subscribe();

        let id = modules.reload_dev_module(&dev_dir).await.unwrap();
        assert_eq!(id, "acme");

        let stable = modules
            .get_module_version("acme", ModuleVersionMode::Stable, None)
            .unwrap();
        assert!(stable.is_dev());
        assert!(matches!(
            updates.recv().await.unwrap(),
            ModuleInfoUpdate::Update { .. }
        ));
    }

    #[tokio::test]
    async fn test_reload_dev_module_missing() {
        let temp = TempDir::new().unwrap();
        assert!(index().reload_dev_module(temp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_help_markdown() {
        let temp = TempDir::new().unwrap();
        let dir = write_module(temp.path(), "acme", "1.0.0", "");
        std::fs::write(dir.join(HELP_PATH), "# Acme").unwrap();

        let modules = index();
        modules
            .init_modules(&[ScanSource::Store(temp.path().to_path_buf())], None)
            .await;

        let help = modules
            .get_help_for_module("acme", ModuleVersionMode::SpecificVersion, Some("1.0.0"))
            .await
            .unwrap();
        assert_eq!(help.markdown, "# Acme");
        assert_eq!(help.base_url, "/int/help/module/acme/specific-version/1.0.0");

        let latest = modules
            .get_help_for_module("acme", ModuleVersionMode::Stable, Some("ignored"))
            .await
            .unwrap();
        assert_eq!(latest.base_url, "/int/help/module/acme/stable/latest");

        let missing = modules
            .get_help_for_module("acme", ModuleVersionMode::Custom, Some("1.0.0"))
            .await;
        assert!(matches!(missing, Err(HelpError::NoFile)));
    }

    #[tokio::test]
    async fn test_help_assets() {
        let temp = TempDir::new().unwrap();
        let dir = write_module(temp.path(), "acme", "1.0.0", "");
        std::fs::write(dir.join(HELP_PATH), "![x](images/wiring.png)").unwrap();
        std::fs::create_dir_all(dir.join("companion/images")).unwrap();
        std::fs::write(dir.join("companion/images/wiring.png"), b"png").unwrap();
        std::fs::write(dir.join("companion/secret.js"), b"js").unwrap();

        let modules = index();
        modules
            .init_modules(&[ScanSource::Store(temp.path().to_path_buf())], None)
            .await;

        let asset = modules
            .get_help_asset("acme", ModuleVersionMode::Stable, None, "images/wiring.png")
            .unwrap();
        assert_eq!(asset.content_type, "image/png");
        assert_eq!(asset.path, dir.join("companion/images/wiring.png"));

        let lookup = |file: &str| {
            modules.get_help_asset("acme", ModuleVersionMode::Stable, None, file)
        };
        assert!(lookup("secret.js").is_none());
        assert!(lookup("../companion/images/wiring.png").is_none());
        assert!(lookup("/etc/passwd.png").is_none());
        assert!(lookup("missing.png").is_none());
    }

    #[test]
    fn test_priority_list_order() {
        let dirs = ModuleDirs {
            bundled_legacy_modules_dir: PathBuf::from("/l"),
            bundled_modules_dir: PathBuf::from("/b"),
            custom_modules_dir: PathBuf::from("/c"),
            store_modules_dir: PathBuf::from("/s"),
        };
        let paths: Vec<_> = ScanSource::priority_list(&dirs)
            .iter()
            .map(|s| s.path().to_path_buf())
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/l"),
                PathBuf::from("/b"),
                PathBuf::from("/s"),
                PathBuf::from("/c")
            ]
        );
    }

    #[test]
    fn test_update_serialization() {
        let update = ModuleInfoUpdate::Remove {
            id: "acme".to_string(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "remove");
        assert_eq!(json["id"], "acme");
    }
}
