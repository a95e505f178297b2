//! Work item types for the queue

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::error::QueueError;

/// Opaque task identifier supplied by the caller
///
/// Used for correlation only. Ids need not be unique: enqueueing the same
/// id twice creates two independent work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a task id from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<u64> for TaskId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pending work item, owned by the queue from enqueue until dispatch
pub struct WorkItem<T> {
    /// Enqueue ordinal, unique per item (ids are not)
    pub seq: u64,
    pub id: TaskId,
    /// Retries allowed after the first attempt, fixed at enqueue time
    pub retry_limit: u32,
    pub submitted_at: Instant,
    /// Single-assignment reply channel backing the caller's handle
    pub reply: oneshot::Sender<Result<T, QueueError>>,
}

impl<T> std::fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("seq", &self.seq)
            .field("id", &self.id)
            .field("retry_limit", &self.retry_limit)
            .finish()
    }
}

/// Bookkeeping for an item that has been dispatched and is not yet terminal
#[derive(Debug, Clone)]
pub struct RunningItem {
    pub id: TaskId,
    pub status: ItemStatus,
    pub attempts_remaining: u32,
    pub started_at: Instant,
}

/// Status of a live queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Waiting in the pending queue
    Queued,
    /// A runner attempt is in flight
    Dispatched,
    /// Between failed attempt and re-dispatch
    Retrying,
}

/// Handle to a single submission, settling exactly once
///
/// Resolves `Ok` with the runner's success value, or `Err` carrying the
/// task id once retries are exhausted.
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Result<T, QueueError>>) -> Self {
        Self { id, rx }
    }

    /// Get the task id this handle tracks
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            Err(_) => Err(QueueError::Shutdown { id }),
        })
    }
}

/// Statistics for the queue
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_dispatched: u64,
    pub total_completed: u64,
    pub total_abandoned: u64,
    pub total_retries: u64,
    pub total_wait_time_ms: u64,
    pub peak_queue_depth: usize,
    pub peak_running: usize,
}

/// Point-in-time queue state
#[derive(Debug, Clone)]
pub struct QueueState {
    pub running: usize,
    pub queued: usize,
    pub stats: QueueStats,
}

/// Per-item entry for queue display
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: TaskId,
    pub seq: u64,
    pub status: ItemStatus,
    pub attempts_remaining: u32,
    /// Time since dispatch for live items, time since enqueue for queued ones
    pub wait_time: Duration,
}
