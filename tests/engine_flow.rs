//! End-to-end engine flow tests
//!
//! Exercises the full optimistic path the dashboard views rely on:
//! - load -> stage -> optimistic working view -> grace commit -> refresh
//! - undo inside the grace period
//! - ledger redemptions persisted through the same staged mechanism

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use anteroom::{
    AllotmentItem, Cadence, CommitController, EngineConfig, EngineEvent, LedgerEngine,
    MemoryBackend, Record, RedemptionEvent,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fields(pairs: &[(&str, JsonValue)]) -> Map<String, JsonValue> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn config(grace_ms: u64) -> EngineConfig {
    EngineConfig {
        grace_period: Duration::from_millis(grace_ms),
        ..EngineConfig::default()
    }
}

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Todo {
    id: String,
    title: String,
    done: bool,
}

impl Record for Todo {
    const COLLECTION: &'static str = "todos";

    fn id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Optimistic edit lifecycle
// =============================================================================

#[tokio::test]
async fn test_edit_commit_refresh_cycle() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(
        "todos",
        vec![
            json!({ "id": "t1", "title": "water the plants", "done": false }),
            json!({ "id": "t2", "title": "file taxes", "done": false }),
        ],
    );

    let ctrl = CommitController::new(backend.clone(), config(40));
    let mut rx = ctrl.events().subscribe();
    ctrl.load("todos").await.unwrap();

    // Typed read through the Record trait
    let todos: Vec<Todo> = ctrl.working_view_as().await.unwrap();
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0].title, "water the plants");

    // Stage an edit: visible immediately, nothing written yet
    ctrl.stage_edit("todos", "t1", fields(&[("done", json!(true))])).unwrap();
    let todos: Vec<Todo> = ctrl.working_view_as().await.unwrap();
    assert!(todos[0].done);
    assert_eq!(backend.upsert_calls(), 0);
    assert_eq!(ctrl.change_count("todos"), 1);

    // Grace period elapses: exactly one write, staging drained
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.upsert_calls(), 1);
    assert_eq!(ctrl.change_count("todos"), 0);

    // The committed row is what a fresh fetch sees
    let todos: Vec<Todo> = ctrl.working_view_as().await.unwrap();
    assert!(todos[0].done);

    // Broadcast carried the staged -> committed -> refresh sequence
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event {
            EngineEvent::EditStaged { .. } => "staged",
            EngineEvent::RowCommitted { .. } => "committed",
            EngineEvent::RefreshRequested { .. } => "refresh",
            _ => "other",
        });
    }
    assert_eq!(kinds, vec!["staged", "committed", "refresh"]);
}

#[tokio::test]
async fn test_undo_from_toast_leaves_store_untouched() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed("todos", vec![json!({ "id": "t1", "title": "keep me", "done": false })]);

    let ctrl = CommitController::new(backend.clone(), config(150));
    let mut rx = ctrl.events().subscribe();
    ctrl.load("todos").await.unwrap();

    ctrl.stage_edit("todos", "t1", fields(&[("title", json!("typo"))])).unwrap();

    // The toast deadline equals the staged-at instant plus the grace period
    let deadline = match rx.recv().await.unwrap() {
        EngineEvent::EditStaged { deadline, .. } => deadline,
        other => panic!("expected EditStaged, got {:?}", other),
    };
    assert!(deadline > Utc::now());

    // The undo action on the toast
    assert!(ctrl.undo("todos", "t1"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.upsert_calls(), 0);

    let todos: Vec<Todo> = ctrl.working_view_as().await.unwrap();
    assert_eq!(todos[0].title, "keep me");
}

#[tokio::test]
async fn test_cross_module_refresh_signal() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed("priorities", vec![json!({ "id": "p1", "rank": 1 })]);

    let ctrl = CommitController::new(backend, config(30));
    ctrl.load("priorities").await.unwrap();

    // A sibling module subscribing only for refresh signals
    let mut rx = ctrl.events().subscribe();
    ctrl.stage_edit("priorities", "p1", fields(&[("rank", json!(2))])).unwrap();

    let refreshed = tokio::time::timeout(Duration::from_secs(2), async move {
        loop {
            if let EngineEvent::RefreshRequested { collection } = rx.recv().await.unwrap() {
                return collection;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(refreshed, "priorities");
}

// =============================================================================
// Ledger redemptions through the optimistic pipeline
// =============================================================================

#[tokio::test]
async fn test_redeem_persists_through_staged_commit() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(
        "allotments",
        vec![json!({
            "id": "a1", "item_type": "takeout", "quota": 2, "cadence": "weekly"
        })],
    );
    backend.seed("redemptions", vec![]);
    backend.seed("overages", vec![]);

    let ctrl = CommitController::new(backend.clone(), config(40));
    let mut ledger = LedgerEngine::load_from(backend.as_ref(), 3).await.unwrap();
    let mut rx = ctrl.events().subscribe();

    // Redeem locally, then persist the event row the same way any other
    // edit flows: staged, optimistic, committed after the grace period
    let now = at("2025-06-10T12:00:00Z");
    let event = ledger.redeem("takeout", now).unwrap();
    assert_eq!(ledger.remaining("takeout", now).unwrap(), 1);

    let mut row = match serde_json::to_value(&event).unwrap() {
        JsonValue::Object(map) => map,
        _ => unreachable!(),
    };
    row.remove("id");
    ctrl.stage_insert_with_id(RedemptionEvent::COLLECTION, &event.id, row).unwrap();

    // Settle the ledger entry when its row lands
    let committed_id = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let EngineEvent::RowCommitted { row_id, .. } = rx.recv().await.unwrap() {
                return row_id;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(committed_id, event.id);
    ledger.settle(&committed_id);

    // Settled history: undo now compensates instead of deleting
    assert!(ledger.undo_redeem("takeout").is_some());
    assert_eq!(ledger.events().len(), 2);

    // The row reached the backing store
    let row = backend.row("redemptions", &event.id).unwrap();
    assert_eq!(row["item_type"], json!("takeout"));
}

#[tokio::test]
async fn test_undo_redeem_inside_grace_deletes_event_and_row() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(
        "allotments",
        vec![json!({
            "id": "a1", "item_type": "takeout", "quota": 1, "cadence": "weekly"
        })],
    );
    backend.seed("redemptions", vec![]);
    backend.seed("overages", vec![]);

    let ctrl = CommitController::new(backend.clone(), config(150));
    let mut ledger = LedgerEngine::load_from(backend.as_ref(), 3).await.unwrap();

    let now = at("2025-06-10T12:00:00Z");
    let event = ledger.redeem("takeout", now).unwrap();
    let mut row = match serde_json::to_value(&event).unwrap() {
        JsonValue::Object(map) => map,
        _ => unreachable!(),
    };
    row.remove("id");
    ctrl.stage_insert_with_id(RedemptionEvent::COLLECTION, &event.id, row).unwrap();

    // Undo both halves inside the grace period: the log entry vanishes
    // outright and the row never reaches the store
    assert!(ledger.undo_redeem("takeout").is_none());
    assert!(ctrl.undo(RedemptionEvent::COLLECTION, &event.id));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.upsert_calls(), 0);
    assert!(ledger.events().is_empty());
    assert_eq!(ledger.remaining("takeout", now).unwrap(), 1);
}

// =============================================================================
// Allotment items are edited like any other rows
// =============================================================================

#[tokio::test]
async fn test_allotment_edit_flows_into_ledger() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(
        "allotments",
        vec![json!({
            "id": "a1", "item_type": "takeout", "quota": 1, "cadence": "weekly"
        })],
    );
    backend.seed("redemptions", vec![]);
    backend.seed("overages", vec![]);

    let ctrl = CommitController::new(backend.clone(), config(30));
    ctrl.load(AllotmentItem::COLLECTION).await.unwrap();

    // Bump the quota through the staged mechanism
    ctrl.stage_edit(AllotmentItem::COLLECTION, "a1", fields(&[("quota", json!(3))])).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // A ledger refresh sees the committed quota
    let items: Vec<AllotmentItem> = ctrl.working_view_as().await.unwrap();
    let mut ledger = LedgerEngine::new(3);
    ledger.replace_items(items).unwrap();

    let now = at("2025-06-10T12:00:00Z");
    assert_eq!(ledger.remaining("takeout", now).unwrap(), 3);
    assert!(matches!(ledger.items()[0].cadence, Cadence::Weekly));
}
