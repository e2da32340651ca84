//! Test environments
//!
//! A `TestEnv` owns a temporary directory holding every module root and the
//! cache, and wires a `ModuleSystem` over mock collaborators.

#![allow(dead_code)]

use deckhand_core::types::ModulesConfig;
use deckhand_modules::{CacheStore, ModuleSystem};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use super::mocks::{MemoryCache, MockStoreApi, RecordingUsageController};

pub struct TestEnv {
    pub temp: TempDir,
    pub config: ModulesConfig,
    pub api: Arc<MockStoreApi>,
    pub cache: Arc<MemoryCache>,
    pub usage: Arc<RecordingUsageController>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_api(MockStoreApi::new())
    }

    pub fn with_api(api: MockStoreApi) -> Self {
        init_test_tracing();
        let temp = TempDir::new().unwrap();
        let mut config = ModulesConfig::default().resolve_paths(temp.path());
        config.store.http_timeout_secs = 5;

        Self {
            temp,
            config,
            api: Arc::new(api),
            cache: Arc::new(MemoryCache::new()),
            usage: Arc::new(RecordingUsageController::new()),
        }
    }

    pub fn with_max_archive_bytes(mut self, limit: u64) -> Self {
        self.config.install.max_archive_bytes = limit;
        self
    }

    pub fn with_dev_dir(mut self) -> Self {
        self.config.paths.dev_modules_dir = Some(self.temp.path().join("dev-modules"));
        self
    }

    pub fn bundled_dir(&self) -> PathBuf {
        self.config.paths.bundled_modules_dir.clone()
    }

    pub fn legacy_dir(&self) -> PathBuf {
        self.config.paths.bundled_legacy_modules_dir.clone()
    }

    pub fn store_dir(&self) -> PathBuf {
        self.config.paths.store_modules_dir.clone()
    }

    pub fn custom_dir(&self) -> PathBuf {
        self.config.paths.custom_modules_dir.clone()
    }

    pub fn dev_dir(&self) -> PathBuf {
        self.config
            .paths
            .dev_modules_dir
            .clone()
            .unwrap_or_else(|| self.temp.path().join("dev-modules"))
    }

    /// Build a module system sharing this environment's mocks and cache
    pub fn system(&self) -> ModuleSystem {
        let cache: Arc<dyn CacheStore> = self.cache.clone();
        ModuleSystem::with_components(
            self.config.clone(),
            self.usage.clone(),
            self.api.clone(),
            cache,
        )
        .unwrap()
    }

    /// Build and start a module system
    pub async fn started_system(&self) -> ModuleSystem {
        let system = self.system();
        system.start().await.unwrap();
        system
    }
}

/// Route logs through the test harness, filtered by `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
