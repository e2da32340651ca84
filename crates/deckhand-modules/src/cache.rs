//! Durable key/value cache
//!
//! The store catalog persists its state through [`CacheStore`]: single values
//! under a key, and tables of values keyed by id. [`JsonFileCache`] keeps each
//! key and each table in its own JSON file under a cache directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Persistent cache used by the store catalog and installer
pub trait CacheStore: Send + Sync {
    /// Read a single value
    fn get_key(&self, key: &str) -> Result<Option<Value>>;

    /// Replace a single value
    fn set_key(&self, key: &str, value: Value) -> Result<()>;

    /// Read one row of a table
    fn get_table_entry(&self, table: &str, id: &str) -> Result<Option<Value>>;

    /// Replace one row of a table
    fn set_table_entry(&self, table: &str, id: &str, value: Value) -> Result<()>;
}

/// Typed access on top of [`CacheStore`]
pub trait CacheStoreExt {
    fn load_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;
    fn save_key<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;
    fn load_table_entry<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>>;
    fn save_table_entry<T: Serialize>(&self, table: &str, id: &str, value: &T) -> Result<()>;
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {
    fn load_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_key(key)?
            .map(|v| {
                serde_json::from_value(v).with_context(|| format!("Invalid cache value for '{}'", key))
            })
            .transpose()
    }

    fn save_key<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_key(key, serde_json::to_value(value)?)
    }

    fn load_table_entry<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>> {
        self.get_table_entry(table, id)?
            .map(|v| {
                serde_json::from_value(v)
                    .with_context(|| format!("Invalid cache value for '{}/{}'", table, id))
            })
            .transpose()
    }

    fn save_table_entry<T: Serialize>(&self, table: &str, id: &str, value: &T) -> Result<()> {
        self.set_table_entry(table, id, serde_json::to_value(value)?)
    }
}

/// JSON file backed cache
pub struct JsonFileCache {
    cache_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn file_for(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn read_file(&self, name: &str) -> Result<Option<Value>> {
        let path = self.file_for(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {:?}", path))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {:?}", path))?;
        Ok(Some(value))
    }

    fn write_file(&self, name: &str, value: &Value) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", self.cache_dir))?;

        let path = self.file_for(name);
        let tmp = self.cache_dir.join(format!(".{}.json.tmp", name));
        let contents = serde_json::to_string_pretty(value)?;

        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache file: {:?}", tmp))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace cache file: {:?}", path))?;

        debug!("Wrote cache file {:?}", path);
        Ok(())
    }
}

impl CacheStore for JsonFileCache {
    fn get_key(&self, key: &str) -> Result<Option<Value>> {
        self.read_file(key)
    }

    fn set_key(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_file(key, &value)
    }

    fn get_table_entry(&self, table: &str, id: &str) -> Result<Option<Value>> {
        Ok(match self.read_file(table)? {
            Some(Value::Object(mut rows)) => rows.remove(id),
            _ => None,
        })
    }

    fn set_table_entry(&self, table: &str, id: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut rows = match self.read_file(table)? {
            Some(Value::Object(rows)) => rows,
            _ => Map::new(),
        };
        rows.insert(id.to_string(), value);
        self.write_file(table, &Value::Object(rows))
    }
}
