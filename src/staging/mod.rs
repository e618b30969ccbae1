//! Staged edit store
//!
//! Per-collection side-table of uncommitted field patches, new-row markers
//! and removal markers, kept fully separate from the persisted row shape.
//! Patches merge on repeated edits (union of changed field names, latest
//! value per field wins) and are claimed atomically at commit time, which
//! is what makes undo and commit race-free.

pub mod overlay;

pub use overlay::overlay;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::types::RowId;

/// An uncommitted diff against a row's last known persisted state
#[derive(Debug, Clone)]
pub struct StagedPatch {
    /// Target row (a client-minted id when `is_new`)
    pub row_id: RowId,
    /// Field values to apply, latest value per field
    pub fields: Map<String, JsonValue>,
    /// Names of fields touched since staging began.
    ///
    /// Touched stays touched: editing a field back to its original value
    /// does not remove it from this set.
    pub changed: BTreeSet<String>,
    /// Row has never been persisted; commit synthesizes it from `fields`
    pub is_new: bool,
    /// Row is marked for deletion; supersedes any field patch
    pub is_removed: bool,
    /// Staging order, used to keep new-row append order stable
    pub(crate) seq: u64,
}

impl StagedPatch {
    /// Whether this patch represents a real change worth counting
    pub fn counts_as_change(&self) -> bool {
        self.is_new || self.is_removed || !self.changed.is_empty()
    }
}

/// Staged edits for all collections
#[derive(Default)]
pub struct StagedEditStore {
    collections: DashMap<String, HashMap<RowId, StagedPatch>>,
    seq: AtomicU64,
}

impl StagedEditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Merge a field patch into the staged edits for a row.
    ///
    /// `is_new` marks rows that have never been persisted; once set it
    /// sticks for the life of the patch. Staging a field twice yields one
    /// changed-field entry. An edit to a row previously marked removed
    /// starts a fresh edit patch.
    pub fn stage_edit(
        &self,
        collection: &str,
        row_id: &str,
        fields: Map<String, JsonValue>,
        is_new: bool,
    ) {
        let mut patches = self.collections.entry(collection.to_string()).or_default();
        let seq = self.next_seq();

        let patch = patches.entry(row_id.to_string()).or_insert_with(|| StagedPatch {
            row_id: row_id.to_string(),
            fields: Map::new(),
            changed: BTreeSet::new(),
            is_new: false,
            is_removed: false,
            seq,
        });

        if patch.is_removed {
            // Removal superseded by a subsequent edit: start over
            patch.fields.clear();
            patch.changed.clear();
            patch.is_removed = false;
        }

        patch.is_new |= is_new;
        for (name, value) in fields {
            patch.changed.insert(name.clone());
            patch.fields.insert(name, value);
        }
        debug!(collection, row_id, changed = patch.changed.len(), "edit staged");
    }

    /// Mark a row for removal, discarding any prior field patch for it
    pub fn stage_removal(&self, collection: &str, row_id: &str) {
        let mut patches = self.collections.entry(collection.to_string()).or_default();
        let seq = self.next_seq();
        patches.insert(
            row_id.to_string(),
            StagedPatch {
                row_id: row_id.to_string(),
                fields: Map::new(),
                changed: BTreeSet::new(),
                is_new: false,
                is_removed: true,
                seq,
            },
        );
        debug!(collection, row_id, "removal staged");
    }

    /// Discard the patch for a row entirely (undo)
    pub fn unstage(&self, collection: &str, row_id: &str) -> Option<StagedPatch> {
        self.take(collection, row_id)
    }

    /// Atomically claim the patch for a row.
    ///
    /// Exactly one of undo and commit gets the patch; the other sees None.
    pub fn take(&self, collection: &str, row_id: &str) -> Option<StagedPatch> {
        let mut patches = self.collections.get_mut(collection)?;
        let taken = patches.remove(row_id);
        if taken.is_some() {
            debug!(collection, row_id, "patch claimed");
        }
        taken
    }

    /// Atomically claim every patch in a collection, in staging order
    pub fn take_all(&self, collection: &str) -> Vec<StagedPatch> {
        let Some(mut patches) = self.collections.get_mut(collection) else {
            return Vec::new();
        };
        let mut all: Vec<StagedPatch> = patches.drain().map(|(_, p)| p).collect();
        all.sort_by_key(|p| p.seq);
        all
    }

    /// Look at a row's staged patch without claiming it
    pub fn get(&self, collection: &str, row_id: &str) -> Option<StagedPatch> {
        self.collections.get(collection)?.get(row_id).cloned()
    }

    /// All staged patches for a collection, in staging order
    pub fn staged(&self, collection: &str) -> Vec<StagedPatch> {
        let Some(patches) = self.collections.get(collection) else {
            return Vec::new();
        };
        let mut all: Vec<StagedPatch> = patches.values().cloned().collect();
        all.sort_by_key(|p| p.seq);
        all
    }

    /// Number of pending changes for a collection.
    ///
    /// One per new row regardless of how many fields were populated, one
    /// per removal, one per edit patch with at least one changed field.
    /// Zero exactly when the collection holds no patches that matter.
    pub fn change_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|patches| patches.values().filter(|p| p.counts_as_change()).count())
            .unwrap_or(0)
    }

    /// Discard all patches for a collection (bulk cancel / after bulk commit)
    pub fn clear(&self, collection: &str) {
        if let Some(mut patches) = self.collections.get_mut(collection) {
            patches.clear();
        }
        debug!(collection, "staging cleared");
    }

    /// Whether a collection has no staged patches at all
    pub fn is_empty(&self, collection: &str) -> bool {
        self.collections
            .get(collection)
            .map(|p| p.is_empty())
            .unwrap_or(true)
    }
}
