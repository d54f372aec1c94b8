//! Run events: a structured feed of what a pipeline run is doing.
//!
//! Components publish counts, ids and durations here instead of narrating
//! progress to a console. Subscribers (CLI, tests, dashboards) decide how to
//! present them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// A block was appended to a context history
    ContextAppended {
        title: String,
        records: usize,
        chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// A retrieval call finished
    RetrievalCompleted {
        collections: usize,
        records: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A collection was skipped because its query failed
    CollectionSkipped {
        collection: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The generator produced an output
    GenerationCompleted {
        model: String,
        prompt_chars: usize,
        output_chars: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for run events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RunEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RunEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RunEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
