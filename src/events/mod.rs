//! Event broadcast - cross-module refresh signaling
//!
//! A closed set of engine events with typed payloads over a broadcast
//! channel. Sibling view modules subscribe and refresh when a mutation
//! lands; emission is fire-and-forget and slow subscribers may lag.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A collection's data changed remotely; views should re-fetch
    RefreshRequested { collection: String },
    /// An edit entered the grace period; the undo affordance should be
    /// shown until `deadline`
    EditStaged {
        collection: String,
        row_id: String,
        deadline: DateTime<Utc>,
    },
    /// A staged edit was undone before commit; no network call was made
    EditDiscarded { collection: String, row_id: String },
    /// A single row reached the backing store
    RowCommitted { collection: String, row_id: String },
    /// A bulk save reached the backing store
    RowsCommitted { collection: String, count: usize },
    /// A commit was rejected by the backing store; the optimistic view
    /// has been rolled back
    CommitFailed {
        collection: String,
        row_id: Option<String>,
        reason: String,
    },
}

impl EngineEvent {
    /// The collection this event concerns
    pub fn collection(&self) -> &str {
        match self {
            Self::RefreshRequested { collection }
            | Self::EditStaged { collection, .. }
            | Self::EditDiscarded { collection, .. }
            | Self::RowCommitted { collection, .. }
            | Self::RowsCommitted { collection, .. }
            | Self::CommitFailed { collection, .. } => collection,
        }
    }
}

/// Broadcast bus for engine events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    ///
    /// Fire-and-forget: an error just means nobody is listening.
    pub fn emit(&self, event: EngineEvent) {
        debug!(?event, "engine event");
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
