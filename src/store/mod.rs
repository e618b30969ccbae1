//! Backing store interface
//!
//! The remote relational store is reached through a thin client that
//! exposes batch upsert/delete and whole-collection selects. The engine
//! treats these as opaque remote calls: a batch succeeds or fails as a
//! whole, nothing more is assumed.

pub mod local;
pub mod memory;

pub use local::{FileStore, LocalStore, MemoryStore};
pub use memory::MemoryBackend;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::types::Result;

/// Range filter for `select_range`, matched against one field per query
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    /// Field the bounds apply to (e.g. "timestamp")
    pub field: String,
    /// Inclusive lower bound
    pub min: Option<JsonValue>,
    /// Inclusive upper bound
    pub max: Option<JsonValue>,
}

impl RowFilter {
    /// Filter on a single field with optional inclusive bounds
    pub fn on(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            min: None,
            max: None,
        }
    }

    pub fn min(mut self, value: JsonValue) -> Self {
        self.min = Some(value);
        self
    }

    pub fn max(mut self, value: JsonValue) -> Self {
        self.max = Some(value);
        self
    }

    /// Whether a row passes the filter.
    ///
    /// Values are compared as JSON strings when both sides are strings
    /// (timestamps in RFC 3339 order correctly), numerically when both are
    /// numbers; rows missing the field are excluded.
    pub fn matches(&self, row: &JsonValue) -> bool {
        let Some(value) = row.get(&self.field) else {
            return false;
        };

        let within = |bound: &JsonValue, ordering_ok: fn(std::cmp::Ordering) -> bool| -> bool {
            match (value, bound) {
                (JsonValue::String(v), JsonValue::String(b)) => ordering_ok(v.as_str().cmp(b)),
                (JsonValue::Number(v), JsonValue::Number(b)) => {
                    match (v.as_f64(), b.as_f64()) {
                        (Some(v), Some(b)) => ordering_ok(v.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)),
                        _ => false,
                    }
                }
                _ => false,
            }
        };

        if let Some(ref min) = self.min {
            if !within(min, |o| o != std::cmp::Ordering::Less) {
                return false;
            }
        }
        if let Some(ref max) = self.max {
            if !within(max, |o| o != std::cmp::Ordering::Greater) {
                return false;
            }
        }
        true
    }
}

/// Remote row store reached over the thin client SDK
#[async_trait]
pub trait BackingStore: Send + Sync + 'static {
    /// Insert or replace rows by id. Succeeds or fails as a whole batch.
    async fn upsert_rows(&self, collection: &str, rows: Vec<JsonValue>) -> Result<()>;

    /// Delete rows by id. Succeeds or fails as a whole batch.
    async fn delete_rows(&self, collection: &str, ids: Vec<String>) -> Result<()>;

    /// Fetch every row in a collection
    async fn select_all(&self, collection: &str) -> Result<Vec<JsonValue>>;

    /// Fetch rows matching a single-field range filter
    async fn select_range(&self, collection: &str, filter: RowFilter) -> Result<Vec<JsonValue>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_string_bounds() {
        let filter = RowFilter::on("timestamp")
            .min(json!("2025-01-01T00:00:00Z"))
            .max(json!("2025-12-31T23:59:59Z"));

        assert!(filter.matches(&json!({ "timestamp": "2025-06-15T12:00:00Z" })));
        assert!(!filter.matches(&json!({ "timestamp": "2024-12-31T23:59:59Z" })));
        assert!(!filter.matches(&json!({ "timestamp": "2026-01-01T00:00:00Z" })));
        assert!(!filter.matches(&json!({ "other": "2025-06-15T12:00:00Z" })));
    }

    #[test]
    fn test_filter_numeric_bounds() {
        let filter = RowFilter::on("quota").min(json!(1)).max(json!(5));
        assert!(filter.matches(&json!({ "quota": 3 })));
        assert!(!filter.matches(&json!({ "quota": 0 })));
        assert!(!filter.matches(&json!({ "quota": 9 })));
    }

    #[test]
    fn test_filter_unbounded_matches_any_present_field() {
        let filter = RowFilter::on("timestamp");
        assert!(filter.matches(&json!({ "timestamp": "whenever" })));
        assert!(!filter.matches(&json!({})));
    }
}
