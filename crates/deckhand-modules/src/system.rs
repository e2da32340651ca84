//! Wiring of the module lifecycle components

use crate::cache::{CacheStore, JsonFileCache};
use crate::download::ArchiveDownloader;
use crate::index::{InstanceModules, ScanSource};
use crate::installer::InstalledModulesManager;
use crate::store::{HttpStoreApi, ModuleStoreApi, ModuleStoreService};
use crate::usage::ModuleUsageController;
use anyhow::{Context, Result};
use deckhand_core::types::ModulesConfig;
use deckhand_core::ModulesConfigLoader;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The module index, store catalog and installer, built from one configuration
pub struct ModuleSystem {
    config: ModulesConfig,
    modules: Arc<InstanceModules>,
    store: Arc<ModuleStoreService>,
    installer: InstalledModulesManager,
}

impl ModuleSystem {
    /// Build from the configuration in `~/.deckhand`
    pub fn from_default_config(usage: Arc<dyn ModuleUsageController>) -> Result<Self> {
        let config = ModulesConfigLoader::new()?
            .load()
            .context("Failed to load module configuration")?;
        Self::new(config, usage)
    }

    /// Build with the HTTP store client and the JSON file cache
    pub fn new(config: ModulesConfig, usage: Arc<dyn ModuleUsageController>) -> Result<Self> {
        let api = Arc::new(HttpStoreApi::new(&config.store)?);
        let cache = Arc::new(JsonFileCache::new(&config.paths.cache_dir));
        Self::with_components(config, usage, api, cache)
    }

    /// Build with caller supplied store client and cache
    pub fn with_components(
        config: ModulesConfig,
        usage: Arc<dyn ModuleUsageController>,
        api: Arc<dyn ModuleStoreApi>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let modules = Arc::new(InstanceModules::new(usage));
        let store = Arc::new(ModuleStoreService::new(
            api,
            cache.clone(),
            Duration::from_secs(config.store.stale_after_secs),
        ));
        let downloader = ArchiveDownloader::new(&config.store)
            .context("Failed to create module downloader")?;
        let installer = InstalledModulesManager::new(
            modules.clone(),
            store.clone(),
            cache.as_ref(),
            downloader,
            &config.module_dirs(),
            &config.install,
        );

        Ok(Self {
            config,
            modules,
            store,
            installer,
        })
    }

    /// Create the install roots, scan every module directory and kick off
    /// the first store refresh if the catalog was never fetched
    pub async fn start(&self) -> Result<()> {
        self.installer.init().await?;

        let sources = ScanSource::priority_list(&self.config.module_dirs());
        self.modules
            .init_modules(&sources, self.config.paths.dev_modules_dir.as_deref())
            .await;
        info!(
            "Module index ready ({} modules)",
            self.modules.get_modules_json().len()
        );

        self.store.start().await;
        Ok(())
    }

    pub fn config(&self) -> &ModulesConfig {
        &self.config
    }

    pub fn modules(&self) -> &Arc<InstanceModules> {
        &self.modules
    }

    pub fn store(&self) -> &Arc<ModuleStoreService> {
        &self.store
    }

    pub fn installer(&self) -> &InstalledModulesManager {
        &self.installer
    }
}
