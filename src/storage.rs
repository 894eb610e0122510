//! Persistent key-value storage for favorites, credentials and datasource order
//!
//! Hosts usually provide their own settings backend through
//! [`KeyValueStore`]. [`JsonFileStore`] keeps everything in one JSON object on
//! disk and [`MemoryStore`] is for tests and ephemeral sessions.

use crate::common::PathUtils;
use crate::error::{CatalogueError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Persist `value` under `key` before returning
    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CatalogueError::Storage(format!("Invalid value stored under '{}': {}", key, e))),
        None => Ok(None),
    }
}

pub fn store_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.set(key, value)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail, as a full disk or locked settings file would
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(CatalogueError::Storage("Store is read-only".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten atomically on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(CatalogueError::Storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }

        match serde_json::from_slice(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(CatalogueError::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(CatalogueError::Storage(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
        let dir = PathUtils::parent_dir(&self.path);
        PathUtils::ensure_dir_exists(&dir)?;

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, map)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| {
            CatalogueError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_all()?;
        apply(&mut map);
        self.write_all(&map)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings").join("catalogue.json");

        let store = JsonFileStore::new(&path);
        store.set("favorites", json!(["a", "b"])).unwrap();
        store.set("locale", json!("da")).unwrap();
        store.remove("locale").unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("favorites").unwrap(), Some(json!(["a", "b"])));
        assert_eq!(reopened.get("locale").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalogue.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get("x"), Err(CatalogueError::Storage(_))));
    }

    #[test]
    fn typed_helpers_use_serde() {
        let store = MemoryStore::new();
        store_json(&store, "order", &vec!["public".to_string()]).unwrap();
        let order: Option<Vec<String>> = load_json(&store, "order").unwrap();
        assert_eq!(order, Some(vec!["public".to_string()]));

        store.set("order", json!(42)).unwrap();
        assert!(load_json::<Vec<String>>(&store, "order").is_err());
    }

    #[test]
    fn read_only_memory_store_rejects_writes() {
        let store = MemoryStore::new();
        store.set_read_only(true);
        assert!(store.set("a", json!(1)).is_err());
        assert_eq!(store.get("a").unwrap(), None);
    }
}
