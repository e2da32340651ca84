//! Per-module version registry
//!
//! A [`ModuleInfo`] holds every known version of one module id and decides
//! which of them backs a connection for a given [`ModuleVersionMode`].

use deckhand_core::types::{
    ModuleDisplayInfo, ModuleManifest, ModuleVersionMode, ModuleVersionSelection, ReleaseType,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Version id reported for the dev slot in client summaries
pub const DEV_VERSION_ID: &str = "dev";

/// Which slot of the registry a version occupies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleVersionKind {
    /// Bundled or store-installed release
    Release {
        version_id: String,
        release_type: ReleaseType,
        is_builtin: bool,
    },
    /// Locally mounted development build
    Dev,
    /// User uploaded build
    Custom { version_id: String },
}

/// A concrete loaded version of a module
#[derive(Debug, Clone)]
pub struct ModuleVersionInfo {
    pub kind: ModuleVersionKind,
    /// Directory the module was loaded from
    pub base_path: PathBuf,
    /// Path to `companion/HELP.md`, if present
    pub help_path: Option<PathBuf>,
    pub display: ModuleDisplayInfo,
    pub manifest: ModuleManifest,
    /// Shipped inside the application build rather than loaded from outside
    pub is_packaged: bool,
}

impl ModuleVersionInfo {
    /// Slot-specific version id, `None` for the dev slot
    pub fn version_id(&self) -> Option<&str> {
        match &self.kind {
            ModuleVersionKind::Release { version_id, .. } => Some(version_id),
            ModuleVersionKind::Custom { version_id } => Some(version_id),
            ModuleVersionKind::Dev => None,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self.kind, ModuleVersionKind::Dev)
    }

    pub fn has_help(&self) -> bool {
        self.help_path.is_some()
    }

    fn release_type(&self) -> Option<ReleaseType> {
        match &self.kind {
            ModuleVersionKind::Release { release_type, .. } => Some(*release_type),
            _ => None,
        }
    }

    fn is_builtin(&self) -> bool {
        matches!(
            self.kind,
            ModuleVersionKind::Release {
                is_builtin: true,
                ..
            }
        )
    }
}

/// All known versions of one module id
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    id: String,
    replaced_by_ids: Vec<String>,
    dev_module: Option<ModuleVersionInfo>,
    release_versions: BTreeMap<String, ModuleVersionInfo>,
    custom_versions: BTreeMap<String, ModuleVersionInfo>,
}

impl ModuleInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            replaced_by_ids: Vec::new(),
            dev_module: None,
            release_versions: BTreeMap::new(),
            custom_versions: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ids of the modules that replace this one, in discovery order
    pub fn replaced_by_ids(&self) -> &[String] {
        &self.replaced_by_ids
    }

    pub fn dev_module(&self) -> Option<&ModuleVersionInfo> {
        self.dev_module.as_ref()
    }

    pub fn release_versions(&self) -> impl Iterator<Item = &ModuleVersionInfo> {
        self.release_versions.values()
    }

    pub fn custom_versions(&self) -> impl Iterator<Item = &ModuleVersionInfo> {
        self.custom_versions.values()
    }

    /// Whether no version of any kind is loaded
    pub fn is_empty(&self) -> bool {
        self.dev_module.is_none() && self.release_versions.is_empty() && self.custom_versions.is_empty()
    }

    /// Resolve the version backing a connection
    ///
    /// `Stable` and `Prerelease` ignore `version_id`: the dev module wins when
    /// loaded, otherwise the highest semver release of that channel is picked.
    /// `SpecificVersion` and `Custom` are exact lookups and never fall back.
    pub fn get_version(
        &self,
        mode: ModuleVersionMode,
        version_id: Option<&str>,
    ) -> Option<&ModuleVersionInfo> {
        match mode {
            ModuleVersionMode::Stable => self.latest_of(ReleaseType::Stable),
            ModuleVersionMode::Prerelease => self.latest_of(ReleaseType::Prerelease),
            ModuleVersionMode::SpecificVersion => {
                version_id.and_then(|id| self.release_versions.get(id))
            }
            ModuleVersionMode::Custom => version_id.and_then(|id| self.custom_versions.get(id)),
        }
    }

    /// Same as [`get_version`](Self::get_version) with the mode given as its wire name.
    /// Unknown modes resolve to nothing.
    pub fn get_version_by_mode_name(
        &self,
        mode: &str,
        version_id: Option<&str>,
    ) -> Option<&ModuleVersionInfo> {
        let mode = mode.parse::<ModuleVersionMode>().ok()?;
        self.get_version(mode, version_id)
    }

    fn latest_of(&self, release_type: ReleaseType) -> Option<&ModuleVersionInfo> {
        if let Some(dev) = &self.dev_module {
            return Some(dev);
        }

        self.release_versions
            .values()
            .filter(|v| v.release_type() == Some(release_type))
            .fold(None, |latest: Option<&ModuleVersionInfo>, candidate| match latest {
                Some(current)
                    if compare_versions(&candidate.display.version, &current.display.version)
                        != Ordering::Greater =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            })
    }

    /// Client projection, `None` when the module has no versions at all
    pub fn to_client_summary(&self) -> Option<ClientModuleInfo> {
        let stable = self.get_version(ModuleVersionMode::Stable, None);
        let prerelease = self.get_version(ModuleVersionMode::Prerelease, None);

        let base = stable
            .or(prerelease)
            .or_else(|| self.release_versions.values().next())
            .or_else(|| self.custom_versions.values().next())
            .or(self.dev_module.as_ref())?;

        Some(ClientModuleInfo {
            base_info: base.display.clone(),
            has_dev_version: self.dev_module.is_some(),
            stable_version: stable.map(|v| dynamic_version(v, ModuleVersionMode::Stable)),
            prerelease_version: prerelease
                .map(|v| dynamic_version(v, ModuleVersionMode::Prerelease)),
            release_versions: self.release_versions.values().map(release_version).collect(),
            custom_versions: self.custom_versions.values().map(custom_version).collect(),
        })
    }

    pub(crate) fn set_dev_module(&mut self, info: Option<ModuleVersionInfo>) {
        self.dev_module = info;
    }

    /// Insert or replace a release version, keyed by its version id
    pub(crate) fn add_release_version(&mut self, info: ModuleVersionInfo) {
        if let Some(id) = info.version_id().map(str::to_string) {
            self.release_versions.insert(id, info);
        }
    }

    /// Insert or replace a custom version, keyed by its version id
    pub(crate) fn add_custom_version(&mut self, info: ModuleVersionInfo) {
        if let Some(id) = info.version_id().map(str::to_string) {
            self.custom_versions.insert(id, info);
        }
    }

    pub(crate) fn remove_release_version(&mut self, version_id: &str) -> Option<ModuleVersionInfo> {
        self.release_versions.remove(version_id)
    }

    pub(crate) fn remove_custom_version(&mut self, version_id: &str) -> Option<ModuleVersionInfo> {
        self.custom_versions.remove(version_id)
    }

    /// Drop every release loaded from the legacy bundle, returning how many went
    pub(crate) fn remove_legacy_releases(&mut self) -> usize {
        let before = self.release_versions.len();
        self.release_versions
            .retain(|_, v| !(v.is_builtin() && v.display.is_legacy));
        before - self.release_versions.len()
    }

    pub(crate) fn add_replaced_by(&mut self, new_id: impl Into<String>) {
        let new_id = new_id.into();
        if !self.replaced_by_ids.contains(&new_id) {
            self.replaced_by_ids.push(new_id);
        }
    }
}

/// Semver ordering; unparseable versions sort below every valid one
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v')).ok();
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Client view of a module and its selectable versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModuleInfo {
    pub base_info: ModuleDisplayInfo,
    pub has_dev_version: bool,
    pub stable_version: Option<ClientModuleVersionInfoExt>,
    pub prerelease_version: Option<ClientModuleVersionInfoExt>,
    pub release_versions: Vec<ClientModuleVersionInfo>,
    pub custom_versions: Vec<ClientModuleVersionInfo>,
}

/// One selectable version entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModuleVersionInfo {
    pub display_name: String,
    pub is_legacy: bool,
    pub is_dev: bool,
    pub is_builtin: bool,
    pub has_help: bool,
    pub version: ModuleVersionSelection,
}

/// A dynamic ("latest") entry, annotated with the version it currently resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModuleVersionInfoExt {
    #[serde(flatten)]
    pub info: ClientModuleVersionInfo,
    pub version_id: String,
}

fn dynamic_version(version: &ModuleVersionInfo, mode: ModuleVersionMode) -> ClientModuleVersionInfoExt {
    let channel = match mode {
        ModuleVersionMode::Prerelease => "Prerelease",
        _ => "Stable",
    };
    let selection = ModuleVersionSelection { mode, id: None };

    match version.version_id() {
        Some(version_id) => ClientModuleVersionInfoExt {
            info: ClientModuleVersionInfo {
                display_name: format!("Latest {} (v{})", channel, version_id),
                is_legacy: version.display.is_legacy,
                is_dev: false,
                is_builtin: version.is_builtin(),
                has_help: version.has_help(),
                version: selection,
            },
            version_id: version_id.to_string(),
        },
        None => ClientModuleVersionInfoExt {
            info: ClientModuleVersionInfo {
                display_name: format!("Latest {} (Dev)", channel),
                is_legacy: false,
                is_dev: true,
                is_builtin: false,
                has_help: version.has_help(),
                version: selection,
            },
            version_id: DEV_VERSION_ID.to_string(),
        },
    }
}

fn release_version(version: &ModuleVersionInfo) -> ClientModuleVersionInfo {
    let version_id = version.version_id().unwrap_or_default();
    ClientModuleVersionInfo {
        display_name: format!("v{}", version_id),
        is_legacy: version.display.is_legacy,
        is_dev: false,
        is_builtin: version.is_builtin(),
        has_help: version.has_help(),
        version: ModuleVersionSelection {
            mode: ModuleVersionMode::SpecificVersion,
            id: Some(version_id.to_string()),
        },
    }
}

fn custom_version(version: &ModuleVersionInfo) -> ClientModuleVersionInfo {
    let version_id = version.version_id().unwrap_or_default();
    ClientModuleVersionInfo {
        display_name: format!("Custom v{}", version_id),
        is_legacy: false,
        is_dev: false,
        is_builtin: false,
        has_help: version.has_help(),
        version: ModuleVersionSelection {
            mode: ModuleVersionMode::Custom,
            id: Some(version_id.to_string()),
        },
    }
}
