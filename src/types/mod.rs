//! Shared types: row identifiers, record shapes, cache keys
//!
//! Rows travel through the engine as JSON objects with an `"id"` field, the
//! same way the backing store's thin client returns them. Typed views are
//! recovered at the edges through the [`Record`] trait.

pub mod error;

pub use error::{EngineError, Result};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Opaque row identifier, owned by the backing store.
///
/// Rows created client-side are minted a UUID v4 before first save.
pub type RowId = String;

/// Mint an id for a row that has not been persisted yet
pub fn new_row_id() -> RowId {
    uuid::Uuid::new_v4().to_string()
}

/// The JSON field every persisted row carries its id under
pub const ID_FIELD: &str = "id";

/// Composite key for a row within a collection, used by the cache and the
/// commit scheduler. Format: `{collection}:{row_id}`.
pub fn row_key(collection: &str, row_id: &str) -> String {
    format!("{}:{}", collection, row_id)
}

/// Extract the id of a JSON row, if present
pub fn row_id_of(row: &JsonValue) -> Option<&str> {
    row.get(ID_FIELD).and_then(|v| v.as_str())
}

/// A typed row shape for one collection.
///
/// The engine core is untyped (JSON objects); implement this to read a
/// collection back as typed values via `working_view_as`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection this record type lives in
    const COLLECTION: &'static str;

    /// The row's persisted id
    fn id(&self) -> &str;
}
