//! In-memory backing store
//!
//! Stands in for the remote store in tests and development. Counts calls
//! and can inject write failures so commit-exactly-once and rollback
//! behavior are observable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{BackingStore, RowFilter};
use crate::types::{row_id_of, EngineError, Result};

/// In-memory row store with call accounting
#[derive(Default)]
pub struct MemoryBackend {
    /// collection -> (row id -> row), ordered by id for stable selects
    collections: DashMap<String, BTreeMap<String, JsonValue>>,
    upsert_calls: AtomicU64,
    delete_calls: AtomicU64,
    select_calls: AtomicU64,
    /// When set, every write call fails until cleared
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with rows (bypasses call counters)
    pub fn seed(&self, collection: &str, rows: Vec<JsonValue>) {
        let mut map = BTreeMap::new();
        for row in rows {
            if let Some(id) = row_id_of(&row) {
                map.insert(id.to_string(), row.clone());
            }
        }
        self.collections.insert(collection.to_string(), map);
    }

    /// Make subsequent write calls fail with a storage error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of upsert batches received
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of delete batches received
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of select calls received
    pub fn select_calls(&self) -> u64 {
        self.select_calls.load(Ordering::SeqCst)
    }

    /// Fetch one row directly, for assertions
    pub fn row(&self, collection: &str, id: &str) -> Option<JsonValue> {
        self.collections.get(collection).and_then(|m| m.get(id).cloned())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for MemoryBackend {
    async fn upsert_rows(&self, collection: &str, rows: Vec<JsonValue>) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let mut map = self.collections.entry(collection.to_string()).or_default();
        for row in rows {
            let Some(id) = row_id_of(&row).map(str::to_string) else {
                return Err(EngineError::Storage("row without id".to_string()));
            };
            map.insert(id, row);
        }
        debug!(collection, "upsert batch applied");
        Ok(())
    }

    async fn delete_rows(&self, collection: &str, ids: Vec<String>) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        if let Some(mut map) = self.collections.get_mut(collection) {
            for id in &ids {
                map.remove(id);
            }
        }
        debug!(collection, count = ids.len(), "delete batch applied");
        Ok(())
    }

    async fn select_all(&self, collection: &str) -> Result<Vec<JsonValue>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .collections
            .get(collection)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn select_range(&self, collection: &str, filter: RowFilter) -> Result<Vec<JsonValue>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .collections
            .get(collection)
            .map(|m| m.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }
}
