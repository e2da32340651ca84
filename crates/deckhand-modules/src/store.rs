//! Module store catalog cache
//!
//! Mirrors what the remote store offers into two locally cached views: the
//! summary list of all modules and, per module, the list of downloadable
//! versions. Both views survive restarts through a [`CacheStore`] and are
//! refreshed in the background when a subscriber finds them stale.
//!
//! Refreshes are coalesced: while a refresh of a view is in flight, further
//! requests for the same view return immediately without fetching.

use crate::cache::{CacheStore, CacheStoreExt};
use anyhow::{Context, Result};
use async_trait::async_trait;
use deckhand_core::now_millis;
use deckhand_core::types::{
    ModuleStoreInfoCacheStore, ModuleStoreInfoVersionEntry, ModuleStoreListCacheEntry,
    ModuleStoreListCacheStore, StoreConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Cache key of the module summary list
pub const CACHE_STORE_LIST_KEY: &str = "module_store_list";

/// Cache table of per-module version lists
pub const CACHE_STORE_MODULE_TABLE: &str = "module_store";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Remote module store
#[async_trait]
pub trait ModuleStoreApi: Send + Sync {
    /// Fetch the summary of every module in the store
    async fn fetch_module_list(&self) -> Result<Vec<ModuleStoreListCacheEntry>>;

    /// Fetch the downloadable versions of one module
    async fn fetch_module_info(&self, module_id: &str) -> Result<Vec<ModuleStoreInfoVersionEntry>>;
}

#[derive(Debug, Deserialize)]
struct ModuleListResponse {
    modules: Vec<ModuleStoreListCacheEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleInfoResponse {
    versions: Vec<ModuleStoreInfoVersionEntry>,
}

/// Store API over HTTP
///
/// `GET {api_url}modules` returns `{"modules": [...]}` and
/// `GET {api_url}modules/{id}` returns `{"versions": [...]}`.
pub struct HttpStoreApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStoreApi {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut api_url = config.api_url.clone();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        let base_url =
            Url::parse(&api_url).with_context(|| format!("Invalid store API URL: {}", api_url))?;

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to reach module store: {}", url))?
            .error_for_status()
            .with_context(|| format!("Module store request failed: {}", url))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid module store response: {}", url))
    }
}

#[async_trait]
impl ModuleStoreApi for HttpStoreApi {
    async fn fetch_module_list(&self) -> Result<Vec<ModuleStoreListCacheEntry>> {
        let url = self.base_url.join("modules")?;
        let response: ModuleListResponse = self.get_json(url).await?;
        Ok(response.modules)
    }

    async fn fetch_module_info(&self, module_id: &str) -> Result<Vec<ModuleStoreInfoVersionEntry>> {
        let mut url = self.base_url.join("modules")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Store API URL cannot be a base"))?
            .push(module_id);
        let response: ModuleInfoResponse = self.get_json(url).await?;
        Ok(response.versions)
    }
}

/// Notifications for store subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModuleStoreEvent {
    /// Progress of a list refresh, 0.0 to 1.0
    ListProgress { progress: f64 },
    /// New list data
    ListData { data: ModuleStoreListCacheStore },
    /// Progress of a per-module refresh, 0.0 to 1.0
    InfoProgress { module_id: String, progress: f64 },
    /// New per-module data
    InfoData { data: ModuleStoreInfoCacheStore },
}

/// Clears the in-progress marker of a refresh when dropped
struct ListRefreshGuard<'a>(&'a AtomicBool);

impl Drop for ListRefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct InfoRefreshGuard<'a> {
    in_progress: &'a Mutex<HashSet<String>>,
    module_id: String,
}

impl Drop for InfoRefreshGuard<'_> {
    fn drop(&mut self) {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.module_id);
    }
}

/// Cached view of the remote module store
pub struct ModuleStoreService {
    api: Arc<dyn ModuleStoreApi>,
    cache: Arc<dyn CacheStore>,
    list_store: RwLock<ModuleStoreListCacheStore>,
    info_stores: RwLock<HashMap<String, ModuleStoreInfoCacheStore>>,
    is_refreshing_list: AtomicBool,
    refreshing_info: Mutex<HashSet<String>>,
    events: broadcast::Sender<ModuleStoreEvent>,
    stale_after_ms: i64,
}

impl ModuleStoreService {
    /// Create the service, loading the cached list from `cache`
    pub fn new(
        api: Arc<dyn ModuleStoreApi>,
        cache: Arc<dyn CacheStore>,
        stale_after: Duration,
    ) -> Self {
        let list_store = match cache.load_key::<ModuleStoreListCacheStore>(CACHE_STORE_LIST_KEY) {
            Ok(Some(store)) => store,
            Ok(None) => ModuleStoreListCacheStore::default(),
            Err(e) => {
                warn!("Ignoring unreadable module store cache: {:#}", e);
                ModuleStoreListCacheStore::default()
            }
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            api,
            cache,
            list_store: RwLock::new(list_store),
            info_stores: RwLock::new(HashMap::new()),
            is_refreshing_list: AtomicBool::new(false),
            refreshing_info: Mutex::new(HashSet::new()),
            events,
            stale_after_ms: stale_after.as_millis() as i64,
        }
    }

    /// Refresh the list in the background if it has never been fetched
    pub async fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.list_store.read().await.last_updated == 0 {
            info!("Module store list has never been fetched, refreshing");
            Some(self.spawn_list_refresh())
        } else {
            None
        }
    }

    /// Run a list refresh on the runtime
    pub fn spawn_list_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.refresh_store_list_data().await })
    }

    /// Run a per-module refresh on the runtime
    pub fn spawn_info_refresh(self: &Arc<Self>, module_id: &str) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let module_id = module_id.to_string();
        tokio::spawn(async move { service.refresh_store_info_data(&module_id).await })
    }

    fn is_stale(&self, last_updated: i64) -> bool {
        last_updated < now_millis() - self.stale_after_ms
    }

    fn emit(&self, event: ModuleStoreEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Current list plus a receiver for store events. Stale data is
    /// refreshed in the background. Dropping the receiver unsubscribes.
    pub async fn subscribe_list(
        self: &Arc<Self>,
    ) -> (ModuleStoreListCacheStore, broadcast::Receiver<ModuleStoreEvent>) {
        let receiver = self.events.subscribe();
        let snapshot = self.list_store.read().await.clone();

        if self.is_stale(snapshot.last_updated) {
            debug!("Module store list is stale, refreshing");
            self.spawn_list_refresh();
        }

        (snapshot, receiver)
    }

    /// Current version list of one module plus a receiver for store events.
    /// Stale data is refreshed in the background.
    pub async fn subscribe_module(
        self: &Arc<Self>,
        module_id: &str,
    ) -> (ModuleStoreInfoCacheStore, broadcast::Receiver<ModuleStoreEvent>) {
        let receiver = self.events.subscribe();
        let snapshot = self.get_cached_module_info(module_id).await;

        if self.is_stale(snapshot.last_updated) {
            debug!("Module store info for {} is stale, refreshing", module_id);
            self.spawn_info_refresh(module_id);
        }

        (snapshot, receiver)
    }

    /// The cached module list
    pub async fn get_cached_store_list(&self) -> ModuleStoreListCacheStore {
        self.list_store.read().await.clone()
    }

    /// The cached version list of one module, empty if never fetched
    pub async fn get_cached_module_info(&self, module_id: &str) -> ModuleStoreInfoCacheStore {
        if let Some(store) = self.info_stores.read().await.get(module_id) {
            return store.clone();
        }

        // Only persisted records are kept in memory; unknown ids stay out
        let mut stores = self.info_stores.write().await;
        if let Some(store) = stores.get(module_id) {
            return store.clone();
        }
        match self.load_cached_info(module_id) {
            Some(store) => stores.entry(module_id.to_string()).or_insert(store).clone(),
            None => ModuleStoreInfoCacheStore::empty(module_id),
        }
    }

    /// Look up a single cached version entry
    pub async fn get_cached_module_version_info(
        &self,
        module_id: &str,
        version_id: &str,
    ) -> Option<ModuleStoreInfoVersionEntry> {
        self.get_cached_module_info(module_id)
            .await
            .find_version(version_id)
            .cloned()
    }

    fn load_cached_info(&self, module_id: &str) -> Option<ModuleStoreInfoCacheStore> {
        self.cache
            .load_table_entry::<ModuleStoreInfoCacheStore>(CACHE_STORE_MODULE_TABLE, module_id)
            .unwrap_or_else(|e| {
                warn!("Ignoring unreadable store cache for {}: {:#}", module_id, e);
                None
            })
    }

    /// Fetch the module list from the store
    ///
    /// Returns immediately if a list refresh is already running. Failures are
    /// logged and leave the cached list untouched.
    pub async fn refresh_store_list_data(&self) {
        if self.is_refreshing_list.swap(true, Ordering::SeqCst) {
            debug!("Module store list refresh already in progress");
            return;
        }
        let _guard = ListRefreshGuard(&self.is_refreshing_list);

        self.emit(ModuleStoreEvent::ListProgress { progress: 0.0 });

        let modules = match self.api.fetch_module_list().await {
            Ok(modules) => modules,
            Err(e) => {
                warn!("Failed to refresh module store list: {:#}", e);
                return;
            }
        };

        let store = ModuleStoreListCacheStore {
            last_updated: now_millis(),
            modules: modules.into_iter().map(|m| (m.id.clone(), m)).collect(),
        };
        *self.list_store.write().await = store.clone();

        if let Err(e) = self.cache.save_key(CACHE_STORE_LIST_KEY, &store) {
            warn!("Failed to persist module store list: {:#}", e);
        }

        info!("Module store list refreshed ({} modules)", store.modules.len());
        self.emit(ModuleStoreEvent::ListData { data: store });
        self.emit(ModuleStoreEvent::ListProgress { progress: 1.0 });
    }

    /// Fetch the version list of one module from the store
    ///
    /// Returns immediately if a refresh for the same module is already
    /// running. A failed attempt records `lastUpdateAttempt` and an
    /// `updateWarning` but keeps the previously cached versions.
    pub async fn refresh_store_info_data(&self, module_id: &str) {
        {
            let mut in_progress = self
                .refreshing_info
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !in_progress.insert(module_id.to_string()) {
                debug!("Module store refresh for {} already in progress", module_id);
                return;
            }
        }
        let _guard = InfoRefreshGuard {
            in_progress: &self.refreshing_info,
            module_id: module_id.to_string(),
        };

        self.emit(ModuleStoreEvent::InfoProgress {
            module_id: module_id.to_string(),
            progress: 0.0,
        });

        let attempt = now_millis();
        let result = self.api.fetch_module_info(module_id).await;
        let succeeded = result.is_ok();

        let store = {
            let mut stores = self.info_stores.write().await;
            let store = stores
                .entry(module_id.to_string())
                .or_insert_with(|| {
                    self.load_cached_info(module_id)
                        .unwrap_or_else(|| ModuleStoreInfoCacheStore::empty(module_id))
                });
            store.last_update_attempt = attempt;

            match result {
                Ok(versions) => {
                    store.versions = versions;
                    store.last_updated = attempt;
                    store.update_warning = None;
                }
                Err(e) => {
                    warn!("Failed to refresh module store info for {}: {:#}", module_id, e);
                    store.update_warning = Some(format!("Failed to fetch module info: {}", e));
                }
            }
            store.clone()
        };

        if let Err(e) = self
            .cache
            .save_table_entry(CACHE_STORE_MODULE_TABLE, module_id, &store)
        {
            warn!("Failed to persist module store info for {}: {:#}", module_id, e);
        }

        if succeeded {
            debug!(
                "Module store info for {} refreshed ({} versions)",
                module_id,
                store.versions.len()
            );
            self.emit(ModuleStoreEvent::InfoData { data: store });
            self.emit(ModuleStoreEvent::InfoProgress {
                module_id: module_id.to_string(),
                progress: 1.0,
            });
        }
    }
}
