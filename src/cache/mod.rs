//! Snapshot cache
//!
//! Key/value cache of the last-known server data per collection. No TTL:
//! entries live until explicitly invalidated after a committed mutation.
//! Readers treat absent and stale identically and re-fetch on absent.
//!
//! `set` writes through to the local mirror so a reload can serve cached
//! data before the first round-trip completes; `get` falls back to the
//! mirror on a cold miss and promotes the entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::store::LocalStore;

/// A cached snapshot with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached data (a collection snapshot or any JSON value)
    pub data: JsonValue,
    /// When this entry was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(data: JsonValue) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Last-known-data snapshot cache with explicit invalidation
pub struct SnapshotCache {
    entries: DashMap<String, CacheEntry>,
    /// Optional persistent mirror
    local: Option<Arc<dyn LocalStore>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            local: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Create a cache backed by a persistent local mirror
    pub fn with_local(local: Arc<dyn LocalStore>) -> Self {
        Self {
            local: Some(local),
            ..Self::new()
        }
    }

    /// Get a snapshot by key.
    ///
    /// On a cold miss, consults the local mirror and promotes any entry
    /// found there.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        if let Some(entry) = self.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "cache hit");
            return Some(entry.data.clone());
        }

        if let Some(ref local) = self.local {
            if let Some(data) = local.read(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache warm from mirror");
                self.entries.insert(key.to_string(), CacheEntry::new(data.clone()));
                return Some(data);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "cache miss");
        None
    }

    /// Store a snapshot, overwriting wholesale, and mirror it locally
    pub fn set(&self, key: &str, data: JsonValue) {
        if let Some(ref local) = self.local {
            local.write(key, &data);
        }
        self.entries.insert(key.to_string(), CacheEntry::new(data));
        debug!(key, "cache set");
    }

    /// Drop a snapshot. The next read re-fetches.
    pub fn invalidate(&self, key: &str) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(key);
        if let Some(ref local) = self.local {
            local.remove(key);
        }
        debug!(key, "cache invalidated");
    }

    /// When the entry was last fetched, if cached
    pub fn fetched_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.fetched_at)
    }

    /// Clear all entries (mirror untouched)
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}
