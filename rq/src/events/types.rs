//! Event types for queue activity streaming
//!
//! One event per observable transition in an item's lifecycle:
//! enqueued, dispatched, retried, and the two terminals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::TaskId;

/// Core event enum - the vocabulary of queue activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    /// An item was appended to the pending queue
    Enqueued { id: TaskId, seq: u64, retry_limit: u32 },
    /// An item left the pending queue and its first attempt started
    Dispatched { id: TaskId, seq: u64 },
    /// An attempt failed with retry budget remaining
    Retried {
        id: TaskId,
        seq: u64,
        attempts_remaining: u32,
    },
    /// An attempt succeeded; the item is terminal
    Completed { id: TaskId, seq: u64, attempts: u32 },
    /// Retries exhausted; the item is terminal
    Abandoned { id: TaskId, seq: u64, attempts: u32 },
}

impl QueueEvent {
    /// Get the task id for this event
    pub fn task_id(&self) -> TaskId {
        match self {
            QueueEvent::Enqueued { id, .. }
            | QueueEvent::Dispatched { id, .. }
            | QueueEvent::Retried { id, .. }
            | QueueEvent::Completed { id, .. }
            | QueueEvent::Abandoned { id, .. } => *id,
        }
    }

    /// Get the enqueue ordinal for this event
    pub fn seq(&self) -> u64 {
        match self {
            QueueEvent::Enqueued { seq, .. }
            | QueueEvent::Dispatched { seq, .. }
            | QueueEvent::Retried { seq, .. }
            | QueueEvent::Completed { seq, .. }
            | QueueEvent::Abandoned { seq, .. } => *seq,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "Enqueued",
            QueueEvent::Dispatched { .. } => "Dispatched",
            QueueEvent::Retried { .. } => "Retried",
            QueueEvent::Completed { .. } => "Completed",
            QueueEvent::Abandoned { .. } => "Abandoned",
        }
    }

    /// Check if this event ends an item's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueEvent::Completed { .. } | QueueEvent::Abandoned { .. })
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: QueueEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: QueueEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
