//! Ledger engine
//!
//! Read-mostly derived view over the allotment items and the redemption
//! log: remaining counts per cadence window, availability classification
//! and the "coming up" look-ahead. Recomputed on demand, never stored.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::window::{days_until, in_current_window, next_boundary};
use super::{AllotmentItem, OverageRecord, RedemptionEvent};
use crate::store::BackingStore;
use crate::types::{EngineError, Result};

/// An item with its derived quota state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStatus {
    pub item: AllotmentItem,
    /// Redemptions left in the current window
    pub remaining: u32,
    /// Most recent redemption of this type, any window
    pub last_redeemed: Option<DateTime<Utc>>,
    /// Redemptions plus overages in the current calendar year
    pub count_this_year: u32,
}

/// An exhausted item whose window resets within the look-ahead horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComingUp {
    pub item: AllotmentItem,
    /// Calendar days until the window resets
    pub days_until: i64,
    /// Redemptions that become available at the boundary
    pub quota_available: u32,
}

/// Derived ledger classification, computed from the log on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerView {
    pub available: Vec<ItemStatus>,
    pub unavailable: Vec<ItemStatus>,
    pub coming_up: Vec<ComingUp>,
}

/// Cadence quota accounting over the redemption event log
pub struct LedgerEngine {
    items: Vec<AllotmentItem>,
    events: Vec<RedemptionEvent>,
    overages: Vec<OverageRecord>,
    /// Entries still inside the optimistic undo window; deletable outright
    pending: HashSet<String>,
    horizon_days: i64,
}

impl LedgerEngine {
    pub fn new(horizon_days: i64) -> Self {
        Self {
            items: Vec::new(),
            events: Vec::new(),
            overages: Vec::new(),
            pending: HashSet::new(),
            horizon_days,
        }
    }

    /// Load items, events and overages from the backing store
    pub async fn load_from(store: &dyn BackingStore, horizon_days: i64) -> Result<Self> {
        let items: Vec<AllotmentItem> = store
            .select_all("allotments")
            .await
            .map_err(|e| EngineError::Load(format!("allotments: {}", e)))?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        let events: Vec<RedemptionEvent> = store
            .select_all("redemptions")
            .await
            .map_err(|e| EngineError::Load(format!("redemptions: {}", e)))?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;
        let overages: Vec<OverageRecord> = store
            .select_all("overages")
            .await
            .map_err(|e| EngineError::Load(format!("overages: {}", e)))?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;

        for item in &items {
            item.validate()?;
        }
        info!(
            items = items.len(),
            events = events.len(),
            overages = overages.len(),
            "ledger loaded"
        );

        let mut engine = Self::new(horizon_days);
        engine.items = items;
        engine.events = events;
        engine.overages = overages;
        Ok(engine)
    }

    /// Replace the item set (after an allotment edit committed)
    pub fn replace_items(&mut self, items: Vec<AllotmentItem>) -> Result<()> {
        for item in &items {
            item.validate()?;
        }
        self.items = items;
        Ok(())
    }

    pub fn items(&self) -> &[AllotmentItem] {
        &self.items
    }

    pub fn events(&self) -> &[RedemptionEvent] {
        &self.events
    }

    pub fn overages(&self) -> &[OverageRecord] {
        &self.overages
    }

    fn item(&self, item_type: &str) -> Result<&AllotmentItem> {
        self.items
            .iter()
            .find(|i| i.item_type == item_type)
            .ok_or_else(|| EngineError::Validation(format!("unknown allotment type '{}'", item_type)))
    }

    /// Redemptions left for an item in the window containing `now`
    pub fn remaining(&self, item_type: &str, now: DateTime<Utc>) -> Result<u32> {
        Ok(self.remaining_for(self.item(item_type)?, now))
    }

    fn remaining_for(&self, item: &AllotmentItem, now: DateTime<Utc>) -> u32 {
        let consumed: i64 = self
            .events
            .iter()
            .filter(|e| e.item_type == item.item_type)
            .filter(|e| in_current_window(item.cadence, now, e.timestamp))
            .map(|e| e.quantity)
            .sum();
        let consumed = consumed.max(0);
        i64::from(item.allowance()).saturating_sub(consumed).max(0) as u32
    }

    /// Redeem one unit. Local decision: errors with `QuotaExceeded` when
    /// the window is exhausted, without touching the network.
    pub fn redeem(&mut self, item_type: &str, now: DateTime<Utc>) -> Result<RedemptionEvent> {
        let item = self.item(item_type)?;
        if self.remaining_for(item, now) == 0 {
            debug!(item_type, "redeem refused, quota exhausted");
            return Err(EngineError::QuotaExceeded {
                item_type: item_type.to_string(),
            });
        }

        let event = RedemptionEvent::new(item_type, now);
        self.pending.insert(event.id.clone());
        self.events.push(event.clone());
        info!(item_type, "redeemed");
        Ok(event)
    }

    /// Record an overage. Always permitted; never consumes quota.
    pub fn admit_defeat(&mut self, item_type: &str, now: DateTime<Utc>) -> Result<OverageRecord> {
        self.item(item_type)?;
        let record = OverageRecord::new(item_type, now);
        self.pending.insert(record.id.clone());
        self.overages.push(record.clone());
        info!(item_type, "overage recorded");
        Ok(record)
    }

    /// Undo the most recent redemption of a type.
    ///
    /// While the entry is still pending it is deleted outright; once
    /// settled, a compensating decrement is appended instead (history is
    /// never mutated). Returns the entry to persist, None when there was
    /// nothing to undo.
    pub fn undo_redeem(&mut self, item_type: &str) -> Option<RedemptionEvent> {
        let idx = self
            .events
            .iter()
            .rposition(|e| e.item_type == item_type && e.quantity > 0)?;

        if self.pending.remove(&self.events[idx].id) {
            let removed = self.events.remove(idx);
            info!(item_type, "pending redemption deleted");
            debug!(event_id = %removed.id, "removed from log");
            return None;
        }

        let compensation = RedemptionEvent::compensating(&self.events[idx]);
        self.pending.insert(compensation.id.clone());
        self.events.push(compensation.clone());
        info!(item_type, "settled redemption compensated");
        Some(compensation)
    }

    /// Undo the most recent overage of a type. Only pending records can
    /// be undone; settled overage history stays.
    pub fn undo_admit_defeat(&mut self, item_type: &str) -> bool {
        let Some(idx) = self.overages.iter().rposition(|o| o.item_type == item_type) else {
            return false;
        };
        if self.pending.remove(&self.overages[idx].id) {
            self.overages.remove(idx);
            info!(item_type, "pending overage deleted");
            true
        } else {
            false
        }
    }

    /// Mark an entry as committed history (its undo window has passed)
    pub fn settle(&mut self, id: &str) {
        self.pending.remove(id);
    }

    /// Whether an entry is still inside the optimistic undo window
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Classify every item as of `now`
    pub fn view(&self, now: DateTime<Utc>) -> LedgerView {
        let mut view = LedgerView::default();

        for item in &self.items {
            let remaining = self.remaining_for(item, now);
            let status = ItemStatus {
                item: item.clone(),
                remaining,
                last_redeemed: self.last_redeemed(&item.item_type),
                count_this_year: self.count_this_year(&item.item_type, now),
            };

            if remaining > 0 {
                view.available.push(status);
                continue;
            }

            let boundary = next_boundary(item.cadence, now);
            let days = days_until(boundary, now);
            if days <= self.horizon_days {
                view.coming_up.push(ComingUp {
                    item: item.clone(),
                    days_until: days,
                    quota_available: item.allowance(),
                });
            }
            view.unavailable.push(status);
        }

        view.available.sort_by(|a, b| a.item.item_type.cmp(&b.item.item_type));
        view.unavailable.sort_by(|a, b| a.item.item_type.cmp(&b.item.item_type));
        view.coming_up
            .sort_by(|a, b| (a.days_until, &a.item.item_type).cmp(&(b.days_until, &b.item.item_type)));
        view
    }

    fn last_redeemed(&self, item_type: &str) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .filter(|e| e.item_type == item_type && e.quantity > 0)
            .map(|e| e.timestamp)
            .max()
    }

    /// Redemptions plus overages in the calendar year containing `now`
    fn count_this_year(&self, item_type: &str, now: DateTime<Utc>) -> u32 {
        let year = now.year();
        let redeemed: i64 = self
            .events
            .iter()
            .filter(|e| e.item_type == item_type && e.timestamp.year() == year)
            .map(|e| e.quantity)
            .sum();
        let overages = self
            .overages
            .iter()
            .filter(|o| o.item_type == item_type && o.timestamp.year() == year)
            .count() as i64;
        (redeemed.max(0) + overages).max(0) as u32
    }
}
