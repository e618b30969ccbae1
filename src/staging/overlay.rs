//! Working-view merger
//!
//! Pure overlay of staged patches onto a base snapshot: what the user
//! currently sees. Safe to call on every render.

use serde_json::{Map, Value as JsonValue};

use super::StagedPatch;
use crate::types::{row_id_of, ID_FIELD};

/// Overlay staged patches onto a base snapshot.
///
/// Field patches apply to matching base rows by id, rows marked removed are
/// dropped, and new-row patches with no matching base row are appended in
/// staging order. Base row order is preserved.
pub fn overlay(base: &[JsonValue], staged: &[StagedPatch]) -> Vec<JsonValue> {
    let mut out = Vec::with_capacity(base.len());

    for row in base {
        let patch = row_id_of(row).and_then(|id| staged.iter().find(|p| p.row_id == id));
        match patch {
            Some(p) if p.is_removed => continue,
            Some(p) => out.push(apply_fields(row, &p.fields)),
            None => out.push(row.clone()),
        }
    }

    let base_ids: Vec<&str> = base.iter().filter_map(row_id_of).collect();
    let mut new_patches: Vec<&StagedPatch> = staged
        .iter()
        .filter(|p| p.is_new && !p.is_removed && !base_ids.contains(&p.row_id.as_str()))
        .collect();
    new_patches.sort_by_key(|p| p.seq);

    for patch in new_patches {
        out.push(synthesize(patch));
    }

    out
}

/// Apply a field patch to a row, latest value per field
pub(crate) fn apply_fields(row: &JsonValue, fields: &Map<String, JsonValue>) -> JsonValue {
    let mut merged = match row {
        JsonValue::Object(obj) => obj.clone(),
        _ => Map::new(),
    };
    for (name, value) in fields {
        merged.insert(name.clone(), value.clone());
    }
    JsonValue::Object(merged)
}

/// Build a synthetic row for a not-yet-persisted patch
pub(crate) fn synthesize(patch: &StagedPatch) -> JsonValue {
    let mut row = patch.fields.clone();
    row.insert(ID_FIELD.to_string(), JsonValue::String(patch.row_id.clone()));
    JsonValue::Object(row)
}
