//! Anteroom - optimistic mutation and quota ledger engine
//!
//! "Nothing is written until the moment passes"
//!
//! Anteroom is the client-side mutation layer for a personal productivity
//! dashboard backed by a remote row store. Edits are staged locally,
//! shown immediately, and auto-committed after a grace period unless
//! undone; a cadence-quota ledger derives which allocation items are
//! currently redeemable from the redemption event log.

pub mod cache;
pub mod commit;
pub mod config;
pub mod events;
pub mod ledger;
pub mod staging;
pub mod store;
pub mod types;

pub use cache::{CacheStats, SnapshotCache};
pub use commit::{BulkSummary, CommitController, CommitScheduler};
pub use config::EngineConfig;
pub use events::{EngineEvent, EventBus};
pub use ledger::{
    AllotmentItem, Cadence, LedgerEngine, LedgerView, OverageRecord, RedemptionEvent,
};
pub use staging::{overlay, StagedEditStore, StagedPatch};
pub use store::{BackingStore, LocalStore, MemoryBackend, RowFilter};
pub use types::{EngineError, Record, Result, RowId};
