//! Quota ledger
//!
//! Allocation items with cadence-based quotas, a redemption event log,
//! and the derived view classifying items as available, unavailable or
//! coming up. The log is append-only once settled; only entries still
//! inside the optimistic undo window may be deleted outright.

pub mod engine;
pub mod window;

pub use engine::{ComingUp, ItemStatus, LedgerEngine, LedgerView};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{new_row_id, EngineError, Record, Result};

/// Recurrence period governing how often an allocation's quota resets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Monthly,
    /// Consumes quota per calendar month, same bucket as monthly
    Quarterly,
    Yearly,
}

/// An allocation item: how many redemptions its quota permits per window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentItem {
    pub id: String,
    /// What is being redeemed (e.g. "takeout", "movie-night")
    pub item_type: String,
    pub quota: u32,
    pub cadence: Cadence,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

fn default_multiplier() -> u32 {
    1
}

impl AllotmentItem {
    /// Redemptions permitted per window
    pub fn allowance(&self) -> u32 {
        self.quota * self.multiplier
    }

    /// Reject malformed items before they reach staging
    pub fn validate(&self) -> Result<()> {
        if self.item_type.trim().is_empty() {
            return Err(EngineError::Validation("item type must not be empty".into()));
        }
        if self.multiplier == 0 {
            return Err(EngineError::Validation("multiplier must be at least 1".into()));
        }
        Ok(())
    }
}

impl Record for AllotmentItem {
    const COLLECTION: &'static str = "allotments";

    fn id(&self) -> &str {
        &self.id
    }
}

/// One redemption, append-only once settled.
///
/// Quantity is 1 for a redemption and -1 for a compensating undo entry
/// appended after the original has settled into history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionEvent {
    pub id: String,
    pub item_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

impl RedemptionEvent {
    pub fn new(item_type: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_row_id(),
            item_type: item_type.to_string(),
            timestamp,
            quantity: 1,
        }
    }

    /// A decrement cancelling `other` without mutating history. Carries
    /// the original timestamp so it lands in the same quota window.
    pub fn compensating(other: &RedemptionEvent) -> Self {
        Self {
            id: new_row_id(),
            item_type: other.item_type.clone(),
            timestamp: other.timestamp,
            quantity: -other.quantity,
        }
    }
}

impl Record for RedemptionEvent {
    const COLLECTION: &'static str = "redemptions";

    fn id(&self) -> &str {
        &self.id
    }
}

/// "Admit defeat": the item was consumed despite an exhausted quota.
/// Purely statistical; never decrements remaining quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverageRecord {
    pub id: String,
    pub item_type: String,
    pub timestamp: DateTime<Utc>,
}

impl OverageRecord {
    pub fn new(item_type: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_row_id(),
            item_type: item_type.to_string(),
            timestamp,
        }
    }
}

impl Record for OverageRecord {
    const COLLECTION: &'static str = "overages";

    fn id(&self) -> &str {
        &self.id
    }
}
