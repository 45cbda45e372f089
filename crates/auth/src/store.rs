//! Key/value storage for the profile and the last attempted URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,

    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contents are not valid json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// String-keyed JSON store.
///
/// A key holding JSON `null` is considered absent by [`KeyValueStore::has`].
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some_and(|value| !value.is_null()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        (**self).has(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// Every operation re-reads the file, so several processes may share it as
/// long as they don't write concurrently. A missing file is an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&raw)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Unavailable(format!(
                "{} holds {} instead of an object",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    fn save(&self, map: Map<String, Value>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(map))?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Map<String, Value>)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.load()?;
        f(&mut map);
        self.save(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("gatehouse-store-{}", uuid::Uuid::now_v7()))
            .join(name)
    }

    #[test]
    fn in_memory_get_set_remove() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.has("k").unwrap());

        store.set("k", json!({ "roles": ["a"] })).unwrap();
        assert!(store.has("k").unwrap());
        assert_eq!(store.get("k").unwrap(), Some(json!({ "roles": ["a"] })));

        store.remove("k").unwrap();
        assert!(!store.has("k").unwrap());
    }

    #[test]
    fn null_counts_as_absent() {
        let store = InMemoryStore::new();
        store.set("k", Value::Null).unwrap();
        assert!(!store.has("k").unwrap());
        assert_eq!(store.get("k").unwrap(), Some(Value::Null));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let path = scratch_path("session.json");

        let first = FileStore::new(&path);
        assert!(!first.has("profile").unwrap());
        first.set("profile", json!({ "roles": ["a"] })).unwrap();
        first.set("url", json!("/about")).unwrap();

        let second = FileStore::new(&path);
        assert_eq!(second.get("profile").unwrap(), Some(json!({ "roles": ["a"] })));
        second.remove("profile").unwrap();

        assert!(!first.has("profile").unwrap());
        assert_eq!(first.get("url").unwrap(), Some(json!("/about")));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_store_rejects_non_object_documents() {
        let path = scratch_path("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("k"), Err(StoreError::Unavailable(_))));

        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(store.get("k"), Err(StoreError::Serialization(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
