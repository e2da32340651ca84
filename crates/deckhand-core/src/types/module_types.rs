//! Module manifest and version selection types
//!
//! A module package carries its self-description at `companion/manifest.json`:
//!
//! ```json
//! {
//!   "id": "bmd-atem",
//!   "name": "Blackmagic: ATEM",
//!   "shortname": "atem",
//!   "version": "3.14.1",
//!   "manufacturer": "Blackmagic Design",
//!   "products": ["ATEM"],
//!   "keywords": ["switcher"],
//!   "legacyIds": ["atem"]
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relative path of the manifest inside a module directory or archive
pub const MANIFEST_PATH: &str = "companion/manifest.json";

/// Relative path of the help document inside a module directory
pub const HELP_PATH: &str = "companion/HELP.md";

/// Module manifest (`companion/manifest.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    /// Stable module identity
    pub id: String,

    /// Declared module version
    pub version: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Short name used in labels
    #[serde(default)]
    pub shortname: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Device manufacturer
    #[serde(default)]
    pub manufacturer: String,

    /// Supported products
    #[serde(default)]
    pub products: Vec<String>,

    /// Search keywords
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Bug tracker URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugs: Option<String>,

    /// Source repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Module ids this module replaces
    #[serde(default)]
    pub legacy_ids: Vec<String>,

    /// Runtime requirements, kept as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<serde_json::Value>,

    /// Any other manifest fields, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModuleManifest {
    /// Parse and validate a manifest from raw JSON bytes
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let manifest: ModuleManifest = serde_json::from_slice(data)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate a manifest from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_slice(content.as_bytes())
    }

    /// Check the fields every module must declare
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::missing_field("id"));
        }
        if self.version.trim().is_empty() {
            return Err(Error::missing_field("version"));
        }
        if self.id.contains(&['/', '\\'][..]) || self.id.contains("..") {
            return Err(Error::invalid_manifest(format!(
                "module id '{}' contains path characters",
                self.id
            )));
        }
        if self.version.contains(&['/', '\\'][..]) || self.version.contains("..") {
            return Err(Error::invalid_manifest(format!(
                "module version '{}' contains path characters",
                self.version
            )));
        }
        if self.legacy_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::invalid_manifest("legacyIds contains an empty id"));
        }
        Ok(())
    }

    /// Directory name used on disk for this module version: `{id}-{version}`
    pub fn dir_name(&self) -> String {
        module_dir_name(&self.id, &self.version)
    }

    /// Build the display projection of this manifest
    pub fn to_display(&self, has_help: bool, is_legacy: bool) -> ModuleDisplayInfo {
        ModuleDisplayInfo {
            id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.clone()
            } else {
                self.name.clone()
            },
            version: self.version.clone(),
            has_help,
            bug_url: self
                .bugs
                .clone()
                .or_else(|| self.repository.clone())
                .unwrap_or_default(),
            shortname: self.shortname.clone(),
            manufacturer: self.manufacturer.clone(),
            products: self.products.clone(),
            keywords: self.keywords.clone(),
            is_legacy,
        }
    }
}

/// On-disk directory name for a module version
pub fn module_dir_name(module_id: &str, version_id: &str) -> String {
    format!("{}-{}", module_id, version_id)
}

/// Display metadata for a module version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDisplayInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub has_help: bool,
    pub bug_url: String,
    pub shortname: String,
    pub manufacturer: String,
    pub products: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub is_legacy: bool,
}

/// How a connection selects the module version it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleVersionMode {
    /// Newest stable release (dev override wins)
    Stable,
    /// Newest prerelease (dev override wins)
    Prerelease,
    /// Exact release version
    SpecificVersion,
    /// Exact custom (user uploaded) version
    Custom,
}

impl ModuleVersionMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Prerelease => "prerelease",
            Self::SpecificVersion => "specific-version",
            Self::Custom => "custom",
        }
    }

    /// Whether this mode resolves dynamically and ignores the version id
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Stable | Self::Prerelease)
    }
}

impl fmt::Display for ModuleVersionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleVersionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stable" => Ok(Self::Stable),
            "prerelease" => Ok(Self::Prerelease),
            "specific-version" => Ok(Self::SpecificVersion),
            "custom" => Ok(Self::Custom),
            other => Err(Error::invalid_version_mode(other)),
        }
    }
}

/// Release channel of an installed release version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Stable,
    Prerelease,
}

impl ReleaseType {
    /// Classify a version string: any semver pre-release component makes it a prerelease.
    /// Strings that are not valid semver are treated as stable.
    pub fn from_version(version: &str) -> Self {
        match semver::Version::parse(version.trim_start_matches('v')) {
            Ok(v) if !v.pre.is_empty() => Self::Prerelease,
            _ => Self::Stable,
        }
    }
}

/// Module version reference as stored on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVersionSelection {
    pub mode: ModuleVersionMode,
    pub id: Option<String>,
}
