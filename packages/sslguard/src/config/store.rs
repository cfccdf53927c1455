//! Key-value store abstraction for configuration records

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

/// Externally owned key-value store holding one JSON record per key
pub trait ConfigStore: Send + Sync {
    /// Fetch the raw record stored under `key`
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the record stored under `key`
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove the record stored under `key`
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Load and deserialize a typed record, `None` when absent
pub fn load_record<T: DeserializeOwned>(
    store: &dyn ConfigStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Deserialize {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and store a typed record
pub fn save_record<T: Serialize>(
    store: &dyn ConfigStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(record).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

/// In-process store, used for tests and embedding without persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}

/// Directory-backed store writing `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.record_path(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StoreError::Deserialize {
                key: key.to_string(),
                source,
            })
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.record_path(key);
        let raw = serde_json::to_vec_pretty(&value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        // Write-then-rename so readers never observe a half-written record
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.record_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn memory_store_round_trips_typed_records() {
        let store = MemoryStore::new();
        let sample = Sample { name: "a".into(), count: 3 };
        save_record(&store, "sample", &sample).unwrap();
        let loaded: Option<Sample> = load_record(&store, "sample").unwrap();
        assert_eq!(loaded, Some(sample));
        store.delete("sample").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStore::open(dir.path()).unwrap();
        first.set("ssl_config_options", serde_json::json!({"verify_peer": false})).unwrap();

        let second = FileStore::open(dir.path()).unwrap();
        let value = second.get("ssl_config_options").unwrap().unwrap();
        assert_eq!(value["verify_peer"], serde_json::json!(false));
        assert!(second.get("missing").unwrap().is_none());
    }

    #[test]
    fn type_mismatch_is_reported_as_deserialize_error() {
        let store = MemoryStore::new();
        store.set("sample", serde_json::json!({"name": 5})).unwrap();
        let loaded: Result<Option<Sample>, _> = load_record(&store, "sample");
        assert!(matches!(loaded, Err(StoreError::Deserialize { .. })));
    }
}
