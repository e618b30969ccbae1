//! Local key/value mirror
//!
//! Best-effort persistent storage so a reload can paint from cached data
//! before the first network round-trip completes. Not a source of truth:
//! write failures are logged and swallowed.

use std::fs;
use std::path::PathBuf;

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Process-wide persistent key/value store, abstracted
pub trait LocalStore: Send + Sync + 'static {
    /// Read a cached value, absent on any failure
    fn read(&self, key: &str) -> Option<JsonValue>;

    /// Persist a value. Best-effort; failures are swallowed.
    fn write(&self, key: &str, value: &JsonValue);

    /// Drop a persisted value. Best-effort.
    fn remove(&self, key: &str);
}

/// One JSON file per key under a base directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Keys contain `:` separators; keep file names flat
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key.replace([':', '/'], "_")))
    }
}

impl LocalStore for FileStore {
    fn read(&self, key: &str) -> Option<JsonValue> {
        let path = self.path_for(key);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "local mirror hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, "local mirror entry unreadable: {}", e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &JsonValue) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(key, "local mirror dir unavailable: {}", e);
            return;
        }
        let path = self.path_for(key);
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    warn!(key, "local mirror write failed: {}", e);
                }
            }
            Err(e) => warn!(key, "local mirror serialize failed: {}", e),
        }
    }

    fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(key, "local mirror remove failed: {}", e);
            }
        }
    }
}

/// In-memory mirror for tests and mirror-less configurations
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, JsonValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn read(&self, key: &str) -> Option<JsonValue> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn write(&self, key: &str, value: &JsonValue) {
        self.entries.insert(key.to_string(), value.clone());
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());

        let value = json!([{ "id": "a", "title": "one" }]);
        store.write("todos", &value);
        assert_eq!(store.read("todos"), Some(value));

        store.remove("todos");
        assert_eq!(store.read("todos"), None);
    }

    #[test]
    fn test_file_store_key_sanitization() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());

        store.write("snapshot:todos", &json!(1));
        assert_eq!(store.read("snapshot:todos"), Some(json!(1)));
        assert!(dir.path().join("snapshot_todos.json").exists());
    }

    #[test]
    fn test_file_store_write_failure_is_swallowed() {
        // A file where the directory should be makes every write fail
        let dir = tempfile::TempDir::new().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"not a dir").unwrap();

        let store = FileStore::new(blocked);
        store.write("todos", &json!(1));
        assert_eq!(store.read("todos"), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.write("k", &json!({ "v": 1 }));
        assert_eq!(store.read("k"), Some(json!({ "v": 1 })));
        store.remove("k");
        assert_eq!(store.read("k"), None);
    }
}
