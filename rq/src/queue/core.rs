//! RetryQueue implementation

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify, broadcast, oneshot};
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::events::{EventBus, QueueEvent};
use crate::runner::TaskRunner;

use super::error::QueueError;
use super::item::{ItemStatus, QueueEntry, QueueState, QueueStats, RunningItem, TaskHandle, TaskId, WorkItem};

/// Internal state protected by mutex
struct QueueInner<T> {
    /// FIFO queue of items not yet dispatched
    pending: VecDeque<WorkItem<T>>,

    /// Items dispatched and not yet terminal, keyed by enqueue ordinal
    running: HashMap<u64, RunningItem>,

    /// Next enqueue ordinal
    next_seq: u64,

    /// Statistics
    stats: QueueStats,
}

/// Bounded-concurrency task queue with per-task retry
///
/// At most `max_concurrent` items execute at once; an item keeps its slot
/// across all of its retry attempts and releases it only on a terminal
/// outcome. Enqueue order is dispatch order. Clones share the same queue.
///
/// Dropping the queue does not cancel in-flight work: spawned attempts run
/// to completion and keep admitting queued items until the queue drains.
pub struct RetryQueue<T> {
    config: QueueConfig,
    runner: Arc<dyn TaskRunner<Output = T>>,
    events: Arc<EventBus>,
    inner: Arc<Mutex<QueueInner<T>>>,
    notify: Arc<Notify>,
}

impl<T> Clone for RetryQueue<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            runner: Arc::clone(&self.runner),
            events: Arc::clone(&self.events),
            inner: Arc::clone(&self.inner),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<T: Send + 'static> RetryQueue<T> {
    /// Create a new queue driving the given runner
    ///
    /// Fails if `config.max_concurrent` is zero; the limit is never clamped.
    pub fn new(runner: Arc<dyn TaskRunner<Output = T>>, config: QueueConfig) -> Result<Self, QueueError> {
        debug!(?config, "RetryQueue::new: called");
        if config.max_concurrent == 0 {
            return Err(QueueError::ZeroConcurrency);
        }

        Ok(Self {
            config,
            runner,
            events: Arc::new(EventBus::with_default_capacity()),
            inner: Arc::new(Mutex::new(QueueInner {
                pending: VecDeque::new(),
                running: HashMap::new(),
                next_seq: 0,
                stats: QueueStats::default(),
            })),
            notify: Arc::new(Notify::new()),
        })
    }

    /// Submit a work item with the configured default retry limit
    pub async fn enqueue(&self, id: impl Into<TaskId>) -> TaskHandle<T> {
        let retry_limit = self.config.default_retry_limit;
        self.enqueue_with_limit(id, retry_limit).await
    }

    /// Submit a work item with an explicit retry limit
    ///
    /// `retry_limit` counts retries after the first attempt; zero means a
    /// single attempt. The returned handle settles exactly once. Duplicate
    /// ids are independent items.
    pub async fn enqueue_with_limit(&self, id: impl Into<TaskId>, retry_limit: u32) -> TaskHandle<T> {
        let id = id.into();
        debug!(%id, retry_limit, "RetryQueue::enqueue_with_limit: called");
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner.pending.push_back(WorkItem {
            seq,
            id,
            retry_limit,
            submitted_at: Instant::now(),
            reply: tx,
        });
        inner.stats.total_enqueued += 1;
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.pending.len());
        self.events.emit(QueueEvent::Enqueued { id, seq, retry_limit });

        self.admit_locked(&mut inner);

        TaskHandle::new(id, rx)
    }

    /// Sole admission path
    ///
    /// Runs after every enqueue and every terminal completion, under the
    /// same lock acquisition as the change that triggered it. Admits at
    /// most one item per call: each trigger frees or fills at most one slot.
    fn admit_locked(&self, inner: &mut QueueInner<T>) {
        if inner.running.len() >= self.config.max_concurrent {
            debug!(running = inner.running.len(), "RetryQueue::admit_locked: at concurrency limit");
            return;
        }

        let item = match inner.pending.pop_front() {
            Some(item) => item,
            None => {
                debug!("RetryQueue::admit_locked: pending queue empty");
                return;
            }
        };

        let wait_ms = item.submitted_at.elapsed().as_millis() as u64;
        inner.stats.total_wait_time_ms += wait_ms;
        inner.running.insert(
            item.seq,
            RunningItem {
                id: item.id,
                status: ItemStatus::Dispatched,
                attempts_remaining: item.retry_limit,
                started_at: Instant::now(),
            },
        );
        inner.stats.total_dispatched += 1;
        inner.stats.peak_running = inner.stats.peak_running.max(inner.running.len());

        self.events.emit(QueueEvent::Dispatched { id: item.id, seq: item.seq });
        debug!(id = %item.id, seq = item.seq, wait_ms, "RetryQueue::admit_locked: dispatching");

        tokio::spawn(Self::run_item(self.clone(), item));
    }

    /// Drive one item to a terminal outcome
    ///
    /// The retry loop holds the item's slot for its whole lifetime; the
    /// running counter changes once at dispatch and once at completion,
    /// never per attempt.
    async fn run_item(queue: RetryQueue<T>, item: WorkItem<T>) {
        let WorkItem {
            seq, id, retry_limit, reply, ..
        } = item;
        let retry_delay = queue.config.retry_delay();
        let mut remaining = retry_limit;
        let mut attempts: u32 = 0;

        let outcome = loop {
            attempts += 1;
            debug!(%id, seq, attempts, "RetryQueue::run_item: invoking runner");
            match queue.runner.run(id).await {
                Ok(value) => {
                    debug!(%id, seq, attempts, "RetryQueue::run_item: attempt succeeded");
                    queue.events.emit(QueueEvent::Completed { id, seq, attempts });
                    break Ok(value);
                }
                Err(err) => {
                    if remaining == 0 {
                        warn!(%id, seq, attempts, error = %err, "RetryQueue::run_item: retries exhausted, abandoning");
                        queue.events.emit(QueueEvent::Abandoned { id, seq, attempts });
                        break Err(QueueError::Abandoned { id, attempts });
                    }

                    remaining -= 1;
                    warn!(%id, seq, error = %err, retries_left = remaining, "RetryQueue::run_item: attempt failed, retrying");
                    queue.mark_retrying(seq, remaining).await;
                    queue.events.emit(QueueEvent::Retried {
                        id,
                        seq,
                        attempts_remaining: remaining,
                    });

                    if !retry_delay.is_zero() {
                        tokio::time::sleep(retry_delay).await;
                    }
                    queue.mark_dispatched(seq).await;
                }
            }
        };

        let abandoned = outcome.is_err();
        // Settle the handle before the slot is released
        let _ = reply.send(outcome);
        queue.finish_item(seq, abandoned).await;
    }

    async fn mark_retrying(&self, seq: u64, attempts_remaining: u32) {
        let mut inner = self.inner.lock().await;
        inner.stats.total_retries += 1;
        if let Some(entry) = inner.running.get_mut(&seq) {
            entry.status = ItemStatus::Retrying;
            entry.attempts_remaining = attempts_remaining;
        }
    }

    async fn mark_dispatched(&self, seq: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.running.get_mut(&seq) {
            entry.status = ItemStatus::Dispatched;
        }
    }

    /// Release an item's slot and admit the next pending item
    async fn finish_item(&self, seq: u64, abandoned: bool) {
        debug!(seq, abandoned, "RetryQueue::finish_item: called");
        let mut inner = self.inner.lock().await;

        if let Some(item) = inner.running.remove(&seq) {
            debug!(id = %item.id, seq, "RetryQueue::finish_item: removed from running");
            if abandoned {
                inner.stats.total_abandoned += 1;
            } else {
                inner.stats.total_completed += 1;
            }
        } else {
            debug!(seq, "RetryQueue::finish_item: not found in running");
        }

        self.admit_locked(&mut inner);

        drop(inner);

        // Notify waiters that the queue may have drained
        self.notify.notify_waiters();
    }

    /// Wait until no items are pending or running
    pub async fn idle(&self) {
        debug!("RetryQueue::idle: called");
        let notified = self.notify.notified();
        tokio::pin!(notified);

        loop {
            // Register before checking so a completion between the check
            // and the await cannot be missed
            notified.as_mut().enable();
            {
                let inner = self.inner.lock().await;
                if inner.pending.is_empty() && inner.running.is_empty() {
                    return;
                }
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// Get current queue state
    pub async fn queue_state(&self) -> QueueState {
        debug!("RetryQueue::queue_state: called");
        let inner = self.inner.lock().await;

        QueueState {
            running: inner.running.len(),
            queued: inner.pending.len(),
            stats: inner.stats.clone(),
        }
    }

    /// Get per-item entries for display, in enqueue order
    pub async fn queue_details(&self) -> Vec<QueueEntry> {
        debug!("RetryQueue::queue_details: called");
        let inner = self.inner.lock().await;
        let now = Instant::now();

        let mut entries: Vec<_> = inner
            .running
            .iter()
            .map(|(seq, item)| QueueEntry {
                id: item.id,
                seq: *seq,
                status: item.status,
                attempts_remaining: item.attempts_remaining,
                wait_time: now - item.started_at,
            })
            .chain(inner.pending.iter().map(|item| QueueEntry {
                id: item.id,
                seq: item.seq,
                status: ItemStatus::Queued,
                attempts_remaining: item.retry_limit,
                wait_time: now - item.submitted_at,
            }))
            .collect();

        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Get the queue statistics
    pub async fn stats(&self) -> QueueStats {
        debug!("RetryQueue::stats: called");
        let inner = self.inner.lock().await;
        inner.stats.clone()
    }

    /// Get a handle to the queue's event bus
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Subscribe to the queue's event stream
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }
}
