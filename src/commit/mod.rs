//! Optimistic commit controller
//!
//! Decides when a staged patch actually reaches the backing store. Every
//! staged edit starts (or restarts) a per-row grace timer; when it fires
//! the patch is claimed and written, the snapshot cache invalidated and a
//! refresh broadcast. Undo claims the patch first and no network call is
//! ever made.
//!
//! Undo and commit are race-free by construction: both go through the
//! staging store's atomic `take`, so exactly one side wins no matter how
//! close to the deadline the undo lands.

pub mod scheduler;

pub use scheduler::CommitScheduler;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, info};

use crate::cache::SnapshotCache;
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus};
use crate::staging::overlay::{apply_fields, synthesize};
use crate::staging::{overlay, StagedEditStore, StagedPatch};
use crate::store::{BackingStore, FileStore};
use crate::types::{new_row_id, row_id_of, row_key, EngineError, Record, Result, RowId, ID_FIELD};

/// Outcome of a bulk save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub upserted: usize,
    pub deleted: usize,
}

struct Inner {
    store: Arc<dyn BackingStore>,
    staged: StagedEditStore,
    cache: Arc<SnapshotCache>,
    bus: EventBus,
    scheduler: CommitScheduler,
    config: EngineConfig,
}

/// Optimistic mutation engine, one instance shared by all collections.
///
/// Cheap to clone; clones share the same staging store, cache and timers.
#[derive(Clone)]
pub struct CommitController {
    inner: Arc<Inner>,
}

impl CommitController {
    /// Create a controller over a backing store.
    ///
    /// When the config names a local cache directory, snapshots are
    /// mirrored there so a reload paints before the first fetch.
    pub fn new(store: Arc<dyn BackingStore>, config: EngineConfig) -> Self {
        let cache = match config.local_cache_dir {
            Some(ref dir) => Arc::new(SnapshotCache::with_local(Arc::new(FileStore::new(
                dir.clone(),
            )))),
            None => Arc::new(SnapshotCache::new()),
        };

        Self {
            inner: Arc::new(Inner {
                store,
                staged: StagedEditStore::new(),
                cache,
                bus: EventBus::new(config.event_capacity),
                scheduler: CommitScheduler::new(),
                config,
            }),
        }
    }

    /// The engine's event bus
    pub fn events(&self) -> EventBus {
        self.inner.bus.clone()
    }

    /// The snapshot cache (shared with read-only views)
    pub fn cache(&self) -> Arc<SnapshotCache> {
        self.inner.cache.clone()
    }

    fn cache_key(collection: &str) -> String {
        format!("snapshot:{}", collection)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch a collection from the backing store and cache the snapshot
    pub async fn load(&self, collection: &str) -> Result<Vec<JsonValue>> {
        let rows = self
            .inner
            .store
            .select_all(collection)
            .await
            .map_err(|e| EngineError::Load(e.to_string()))?;
        self.inner
            .cache
            .set(&Self::cache_key(collection), JsonValue::Array(rows.clone()));
        debug!(collection, count = rows.len(), "snapshot loaded");
        Ok(rows)
    }

    /// Last-known base snapshot: cache (or mirror), fetched on a cold miss
    async fn base_snapshot(&self, collection: &str) -> Result<Vec<JsonValue>> {
        if let Some(JsonValue::Array(rows)) = self.inner.cache.get(&Self::cache_key(collection)) {
            return Ok(rows);
        }
        self.load(collection).await
    }

    /// What the user currently sees: the base snapshot with all staged
    /// patches overlaid
    pub async fn working_view(&self, collection: &str) -> Result<Vec<JsonValue>> {
        let base = self.base_snapshot(collection).await?;
        Ok(overlay(&base, &self.inner.staged.staged(collection)))
    }

    /// Typed working view for a record type's collection
    pub async fn working_view_as<T: Record>(&self) -> Result<Vec<T>> {
        let rows = self.working_view(T::COLLECTION).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(EngineError::from))
            .collect()
    }

    /// Number of uncommitted changes for a collection
    pub fn change_count(&self, collection: &str) -> usize {
        self.inner.staged.change_count(collection)
    }

    /// Whether a commit timer is counting down for a row
    pub fn pending_commit(&self, collection: &str, row_id: &str) -> bool {
        self.inner.scheduler.is_pending(&row_key(collection, row_id))
    }

    // =========================================================================
    // Staging
    // =========================================================================

    /// Stage a field patch against an existing row and (re)start its
    /// grace timer
    pub fn stage_edit(
        &self,
        collection: &str,
        row_id: &str,
        fields: Map<String, JsonValue>,
    ) -> Result<()> {
        Self::validate_patch(row_id, &fields)?;
        self.inner.staged.stage_edit(collection, row_id, fields, false);
        self.arm(collection, row_id);
        Ok(())
    }

    /// Stage a brand-new row; returns its client-minted id
    pub fn stage_insert(&self, collection: &str, fields: Map<String, JsonValue>) -> Result<RowId> {
        let row_id = new_row_id();
        self.stage_insert_with_id(collection, &row_id, fields)?;
        Ok(row_id)
    }

    /// Stage a brand-new row under a caller-supplied id (used when the id
    /// is already embedded in a domain object, e.g. ledger events)
    pub fn stage_insert_with_id(
        &self,
        collection: &str,
        row_id: &str,
        fields: Map<String, JsonValue>,
    ) -> Result<()> {
        Self::validate_patch(row_id, &fields)?;
        self.inner.staged.stage_edit(collection, row_id, fields, true);
        self.arm(collection, row_id);
        Ok(())
    }

    /// Stage a row removal and start its grace timer
    pub fn stage_removal(&self, collection: &str, row_id: &str) -> Result<()> {
        if row_id.is_empty() {
            return Err(EngineError::Validation("row id must not be empty".into()));
        }
        self.inner.staged.stage_removal(collection, row_id);
        self.arm(collection, row_id);
        Ok(())
    }

    /// Undo a staged change before its grace period elapses.
    ///
    /// Claims the patch and cancels the timer; returns false when there was
    /// nothing left to undo (already committed or never staged). A commit
    /// already dispatched to the network is past undoing and resolves on
    /// its own.
    pub fn undo(&self, collection: &str, row_id: &str) -> bool {
        if self.inner.staged.take(collection, row_id).is_none() {
            return false;
        }
        self.inner.scheduler.cancel(&row_key(collection, row_id));
        self.inner.bus.emit(EngineEvent::EditDiscarded {
            collection: collection.to_string(),
            row_id: row_id.to_string(),
        });
        info!(collection, row_id, "edit undone before commit");
        true
    }

    fn validate_patch(row_id: &str, fields: &Map<String, JsonValue>) -> Result<()> {
        if row_id.is_empty() {
            return Err(EngineError::Validation("row id must not be empty".into()));
        }
        if fields.is_empty() {
            return Err(EngineError::Validation("patch has no fields".into()));
        }
        if fields.contains_key(ID_FIELD) {
            return Err(EngineError::Validation("the id field cannot be edited".into()));
        }
        Ok(())
    }

    /// Start (or restart) the grace timer for a row and surface the undo
    /// affordance deadline
    fn arm(&self, collection: &str, row_id: &str) {
        let deadline = Utc::now()
            + chrono::Duration::from_std(self.inner.config.grace_period)
                .unwrap_or_else(|_| chrono::Duration::milliseconds(2500));

        let this = self.clone();
        let owned_collection = collection.to_string();
        let owned_row = row_id.to_string();
        self.inner.scheduler.schedule(
            &row_key(collection, row_id),
            self.inner.config.grace_period,
            async move {
                this.commit_row(&owned_collection, &owned_row).await;
            },
        );

        self.inner.bus.emit(EngineEvent::EditStaged {
            collection: collection.to_string(),
            row_id: row_id.to_string(),
            deadline,
        });
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit one row's staged patch. Runs when its grace timer fires; a
    /// no-op when undo claimed the patch first.
    async fn commit_row(&self, collection: &str, row_id: &str) {
        let Some(patch) = self.inner.staged.take(collection, row_id) else {
            return;
        };

        match self.write_patch(collection, &patch).await {
            Ok(()) => {
                self.inner.cache.invalidate(&Self::cache_key(collection));
                info!(collection, row_id, "row committed");
                self.inner.bus.emit(EngineEvent::RowCommitted {
                    collection: collection.to_string(),
                    row_id: row_id.to_string(),
                });
                self.inner.bus.emit(EngineEvent::RefreshRequested {
                    collection: collection.to_string(),
                });
            }
            Err(e) => {
                // Patch already claimed and dropped: the working view is
                // back on the last known-good snapshot
                error!(collection, row_id, "commit failed: {}", e);
                self.inner.bus.emit(EngineEvent::CommitFailed {
                    collection: collection.to_string(),
                    row_id: Some(row_id.to_string()),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Translate one patch into its backing-store write
    async fn write_patch(&self, collection: &str, patch: &StagedPatch) -> Result<()> {
        if patch.is_removed {
            return self
                .inner
                .store
                .delete_rows(collection, vec![patch.row_id.clone()])
                .await
                .map_err(|e| EngineError::Commit(e.to_string()));
        }

        let row = if patch.is_new {
            synthesize(patch)
        } else {
            let base = self.base_snapshot(collection).await?;
            match base.iter().find(|r| row_id_of(r) == Some(patch.row_id.as_str())) {
                Some(base_row) => apply_fields(base_row, &patch.fields),
                // Row vanished remotely; the upsert recreates it from the patch
                None => synthesize(patch),
            }
        };

        self.inner
            .store
            .upsert_rows(collection, vec![row])
            .await
            .map_err(|e| EngineError::Commit(e.to_string()))
    }

    /// Commit every staged patch for a collection as one batched upsert
    /// plus one batched removal
    pub async fn commit_all(&self, collection: &str) -> Result<BulkSummary> {
        self.inner.scheduler.cancel_prefix(&format!("{}:", collection));
        let patches = self.inner.staged.take_all(collection);
        if patches.is_empty() {
            return Ok(BulkSummary::default());
        }

        let mut deletes: Vec<String> = Vec::new();
        let mut upserts: Vec<JsonValue> = Vec::new();

        let base = self.base_snapshot(collection).await?;
        for patch in patches.iter().filter(|p| p.counts_as_change()) {
            if patch.is_removed {
                deletes.push(patch.row_id.clone());
            } else if patch.is_new {
                upserts.push(synthesize(patch));
            } else {
                let row = base
                    .iter()
                    .find(|r| row_id_of(r) == Some(patch.row_id.as_str()))
                    .map(|base_row| apply_fields(base_row, &patch.fields))
                    .unwrap_or_else(|| synthesize(patch));
                upserts.push(row);
            }
        }

        let summary = BulkSummary {
            upserted: upserts.len(),
            deleted: deletes.len(),
        };

        let outcome = async {
            if !upserts.is_empty() {
                self.inner
                    .store
                    .upsert_rows(collection, upserts)
                    .await
                    .map_err(|e| EngineError::Commit(e.to_string()))?;
            }
            if !deletes.is_empty() {
                self.inner
                    .store
                    .delete_rows(collection, deletes)
                    .await
                    .map_err(|e| EngineError::Commit(e.to_string()))?;
            }
            Ok::<(), EngineError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                self.inner.cache.invalidate(&Self::cache_key(collection));
                info!(
                    collection,
                    upserted = summary.upserted,
                    deleted = summary.deleted,
                    "bulk save committed"
                );
                self.inner.bus.emit(EngineEvent::RowsCommitted {
                    collection: collection.to_string(),
                    count: summary.upserted + summary.deleted,
                });
                self.inner.bus.emit(EngineEvent::RefreshRequested {
                    collection: collection.to_string(),
                });
                Ok(summary)
            }
            Err(e) => {
                error!(collection, "bulk save failed: {}", e);
                self.inner.bus.emit(EngineEvent::CommitFailed {
                    collection: collection.to_string(),
                    row_id: None,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Discard the entire staged set for a collection and reload the base
    /// snapshot, dropping the optimistic view
    pub async fn cancel_all(&self, collection: &str) -> Result<Vec<JsonValue>> {
        self.inner.scheduler.cancel_prefix(&format!("{}:", collection));
        self.inner.staged.clear(collection);
        self.inner.cache.invalidate(&Self::cache_key(collection));

        let rows = self.load(collection).await?;
        self.inner.bus.emit(EngineEvent::RefreshRequested {
            collection: collection.to_string(),
        });
        Ok(rows)
    }
}
