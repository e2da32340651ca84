//! Module store catalog cache types
//!
//! The store catalog is cached locally in two independent views: a summary
//! list of every module and a per-module record of the available versions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cached summary list of every module in the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStoreListCacheStore {
    /// Unix timestamp (ms) of the last successful refresh, 0 if never
    pub last_updated: i64,

    /// Summary per module id
    #[serde(default)]
    pub modules: HashMap<String, ModuleStoreListCacheEntry>,
}

/// Summary of a single module in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStoreListCacheEntry {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Store page for the module
    pub store_url: String,

    /// Issue tracker / source repository
    #[serde(default)]
    pub github_url: Option<String>,

    /// Hosted help page
    #[serde(default)]
    pub help_url: Option<String>,
}

/// Cached version list for one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStoreInfoCacheStore {
    pub id: String,

    /// Unix timestamp (ms) of the last successful refresh, 0 if never
    pub last_updated: i64,

    /// Unix timestamp (ms) of the last refresh attempt
    #[serde(default)]
    pub last_update_attempt: i64,

    /// Message describing why the last refresh attempt failed
    #[serde(default)]
    pub update_warning: Option<String>,

    #[serde(default)]
    pub versions: Vec<ModuleStoreInfoVersionEntry>,
}

impl ModuleStoreInfoCacheStore {
    /// Empty record for a module that has never been fetched
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_updated: 0,
            last_update_attempt: 0,
            update_warning: None,
            versions: Vec::new(),
        }
    }

    /// Find a version entry by version id
    pub fn find_version(&self, version_id: &str) -> Option<&ModuleStoreInfoVersionEntry> {
        self.versions.iter().find(|v| v.id == version_id)
    }
}

/// A downloadable version of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStoreInfoVersionEntry {
    /// Version id (semver string)
    pub id: String,

    pub is_prerelease: bool,

    /// Unix timestamp (ms)
    pub released_at: i64,

    /// Archive download location, absent when the version cannot be installed
    #[serde(default)]
    pub tar_url: Option<String>,

    /// Set when the version has been withdrawn
    #[serde(default)]
    pub deprecation_reason: Option<String>,
}
