//! Mock implementations for testing
//!
//! Stand-ins for the store backend, the connection layer and the durable
//! cache, recording how they were used.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use deckhand_core::types::{ModuleStoreInfoVersionEntry, ModuleStoreListCacheEntry};
use deckhand_modules::{CacheStore, ModuleStoreApi, ModuleUsageController, ModuleVersionKind};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// In-memory store backend with call counters
pub struct MockStoreApi {
    modules: Mutex<Vec<ModuleStoreListCacheEntry>>,
    versions: Mutex<HashMap<String, Vec<ModuleStoreInfoVersionEntry>>>,
    offline: AtomicBool,
    delay: Duration,
    list_calls: AtomicUsize,
    info_calls: AtomicUsize,
}

impl Default for MockStoreApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreApi {
    pub fn new() -> Self {
        Self {
            modules: Mutex::new(Vec::new()),
            versions: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            delay: Duration::ZERO,
            list_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add a module to the list
    pub fn with_module(self, id: &str) -> Self {
        self.modules.lock().unwrap().push(ModuleStoreListCacheEntry {
            id: id.to_string(),
            name: format!("Test {}", id),
            manufacturer: "Acme".to_string(),
            products: vec!["Projector".to_string()],
            keywords: vec!["test".to_string()],
            store_url: format!("https://store.example/{}", id),
            github_url: None,
            help_url: None,
        });
        self
    }

    /// Add a downloadable version to a module
    pub fn with_version(self, id: &str, version: &str, tar_url: Option<String>) -> Self {
        let is_prerelease = version.contains('-');
        self.with_release(id, version, is_prerelease, tar_url)
    }

    /// List a version with the channel set explicitly, regardless of its version string
    pub fn with_release(
        self,
        id: &str,
        version: &str,
        is_prerelease: bool,
        tar_url: Option<String>,
    ) -> Self {
        self.versions
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(ModuleStoreInfoVersionEntry {
                id: version.to_string(),
                is_prerelease,
                released_at: 1_700_000_000_000,
                tar_url,
                deprecation_reason: None,
            });
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleStoreApi for MockStoreApi {
    async fn fetch_module_list(&self) -> Result<Vec<ModuleStoreListCacheEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.offline.load(Ordering::SeqCst) {
            bail!("store unreachable");
        }
        Ok(self.modules.lock().unwrap().clone())
    }

    async fn fetch_module_info(&self, module_id: &str) -> Result<Vec<ModuleStoreInfoVersionEntry>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.offline.load(Ordering::SeqCst) {
            bail!("store unreachable");
        }
        Ok(self
            .versions
            .lock()
            .unwrap()
            .get(module_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Usage controller that records every call
#[derive(Default)]
pub struct RecordingUsageController {
    stopped: Mutex<Vec<(String, ModuleVersionKind)>>,
    reloaded: Mutex<Vec<String>>,
}

impl RecordingUsageController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stopped(&self) -> Vec<(String, ModuleVersionKind)> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn reloaded(&self) -> Vec<String> {
        self.reloaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModuleUsageController for RecordingUsageController {
    async fn stop_usages_of_module(&self, module_id: &str, kind: &ModuleVersionKind) -> Result<()> {
        self.stopped
            .lock()
            .unwrap()
            .push((module_id.to_string(), kind.clone()));
        Ok(())
    }

    async fn reload_usages_of_module(&self, module_id: &str) -> Result<()> {
        self.reloaded.lock().unwrap().push(module_id.to_string());
        Ok(())
    }
}

/// Cache kept entirely in memory
#[derive(Default)]
pub struct MemoryCache {
    keys: Mutex<HashMap<String, Value>>,
    tables: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get_key(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.keys.lock().unwrap().get(key).cloned())
    }

    fn set_key(&self, key: &str, value: Value) -> Result<()> {
        self.keys.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn get_table_entry(&self, table: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn set_table_entry(&self, table: &str, id: &str, value: Value) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }
}

/// Serve `body` once per connection with chunked transfer encoding, so the
/// response carries no Content-Length. Returns the URL to fetch.
pub async fn serve_chunked(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = "HTTP/1.1 200 OK\r\nContent-Type: application/gzip\r\n\
                            Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                // The client hangs up once it has seen enough
                for chunk in body.chunks(256) {
                    let framed = [
                        format!("{:x}\r\n", chunk.len()).into_bytes(),
                        chunk.to_vec(),
                        b"\r\n".to_vec(),
                    ]
                    .concat();
                    if socket.write_all(&framed).await.is_err() {
                        return;
                    }
                }
                let _ = socket.write_all(b"0\r\n\r\n").await;
            });
        }
    });
    format!("http://{}/module.tgz", addr)
}
