//! Integration tests for the retry queue
//!
//! These tests verify end-to-end behavior: admission gating, retry flow,
//! the event pipeline, and the rq binary.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use retryqueue::config::QueueConfig;
use retryqueue::events::{QueueEvent, read_event_log, spawn_event_logger};
use retryqueue::queue::{QueueError, RetryQueue, TaskId};
use retryqueue::runner::{AttemptError, TaskRunner};

fn config(max_concurrent: usize) -> QueueConfig {
    QueueConfig {
        max_concurrent,
        ..Default::default()
    }
}

/// Runner that reports when an attempt starts and blocks until released
///
/// Lets a test hold slots open and observe exactly which items have been
/// dispatched at each point.
struct GateRunner {
    started_tx: mpsc::UnboundedSender<TaskId>,
    release_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
}

#[async_trait]
impl TaskRunner for GateRunner {
    type Output = ();

    async fn run(&self, id: TaskId) -> Result<(), AttemptError> {
        self.started_tx
            .send(id)
            .map_err(|_| AttemptError::new("probe channel closed"))?;
        let mut rx = self.release_rx.lock().await;
        rx.recv().await.ok_or_else(|| AttemptError::new("release channel closed"))?;
        Ok(())
    }
}

/// Runner that returns canned outcomes in invocation order
struct ScriptedRunner {
    outcomes: std::sync::Mutex<VecDeque<Result<String, AttemptError>>>,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    fn new(outcomes: Vec<Result<String, AttemptError>>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    type Output = String;

    async fn run(&self, _id: TaskId) -> Result<String, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(AttemptError::new("script exhausted")))
    }
}

// =============================================================================
// Admission Gating Tests
// =============================================================================

#[tokio::test]
async fn test_third_task_waits_for_free_slot() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = mpsc::unbounded_channel();
    let runner = Arc::new(GateRunner {
        started_tx,
        release_rx: tokio::sync::Mutex::new(release_rx),
    });
    let queue = RetryQueue::new(runner, config(2)).expect("queue construction");

    let h1 = queue.enqueue_with_limit(1u64, 0).await;
    let h2 = queue.enqueue_with_limit(2u64, 0).await;
    let h3 = queue.enqueue_with_limit(3u64, 0).await;

    // Both slots fill from the front of the queue
    let first = timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("first dispatch")
        .expect("probe channel open");
    let second = timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("second dispatch")
        .expect("probe channel open");
    let started: HashSet<TaskId> = [first, second].into_iter().collect();
    let expected: HashSet<TaskId> = [TaskId::new(1), TaskId::new(2)].into_iter().collect();
    assert_eq!(started, expected);

    // The third item must not start while both slots are held
    let blocked = timeout(Duration::from_millis(100), started_rx.recv()).await;
    assert!(blocked.is_err(), "third task dispatched past the concurrency limit");

    let state = queue.queue_state().await;
    assert_eq!(state.running, 2);
    assert_eq!(state.queued, 1);
    assert_eq!(state.stats.peak_queue_depth, 1);

    // Freeing one slot admits exactly the queue head
    release_tx.send(()).expect("release channel open");
    let third = timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("third dispatch after a completion")
        .expect("probe channel open");
    assert_eq!(third, TaskId::new(3));

    release_tx.send(()).expect("release channel open");
    release_tx.send(()).expect("release channel open");

    for handle in [h1, h2, h3] {
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("handle should settle")
            .expect("task should succeed");
    }

    queue.idle().await;
    let state = queue.queue_state().await;
    assert_eq!(state.running, 0);
    assert_eq!(state.queued, 0);
    assert_eq!(state.stats.total_completed, 3);
    assert_eq!(state.stats.peak_running, 2);
    assert_eq!(state.stats.total_retries, 0);
}

// =============================================================================
// Retry Flow Tests
// =============================================================================

#[tokio::test]
async fn test_task_retries_until_success() {
    let runner = Arc::new(ScriptedRunner::new(vec![
        Err(AttemptError::new("transient 1")),
        Err(AttemptError::new("transient 2")),
        Ok("recovered".to_string()),
    ]));
    let queue = RetryQueue::new(runner.clone(), config(1)).expect("queue construction");

    let handle = queue.enqueue_with_limit(5u64, 2).await;
    let value = timeout(Duration::from_secs(5), handle)
        .await
        .expect("handle should settle")
        .expect("task should succeed on the final attempt");
    assert_eq!(value, "recovered");
    assert_eq!(runner.calls(), 3);

    queue.idle().await;
    let stats = queue.stats().await;
    assert_eq!(stats.total_retries, 2);
    assert_eq!(stats.total_completed, 1);
    assert_eq!(stats.total_abandoned, 0);
}

#[tokio::test]
async fn test_task_abandoned_after_budget() {
    let runner = Arc::new(ScriptedRunner::new(vec![
        Err(AttemptError::new("broken 1")),
        Err(AttemptError::new("broken 2")),
    ]));
    let queue = RetryQueue::new(runner.clone(), config(1)).expect("queue construction");

    let handle = queue.enqueue_with_limit(7u64, 1).await;
    let outcome = timeout(Duration::from_secs(5), handle).await.expect("handle should settle");
    match outcome {
        Err(QueueError::Abandoned { id, attempts }) => {
            assert_eq!(id, TaskId::new(7));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Abandoned, got {other:?}"),
    }
    assert_eq!(runner.calls(), 2, "budget of 1 retry allows exactly 2 attempts");

    queue.idle().await;
    let stats = queue.stats().await;
    assert_eq!(stats.total_abandoned, 1);
    assert_eq!(stats.total_completed, 0);
}

// =============================================================================
// Load Tests
// =============================================================================

/// Runner that fails every item's first attempt and tracks attempt overlap
struct ProbeRunner {
    current: AtomicUsize,
    peak: AtomicUsize,
    attempted: std::sync::Mutex<HashSet<TaskId>>,
}

impl ProbeRunner {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            attempted: std::sync::Mutex::new(HashSet::new()),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunner for ProbeRunner {
    type Output = String;

    async fn run(&self, id: TaskId) -> Result<String, AttemptError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;

        let first_attempt = self.attempted.lock().unwrap().insert(id);
        self.current.fetch_sub(1, Ordering::SeqCst);
        if first_attempt {
            Err(AttemptError::new("first attempt always fails"))
        } else {
            Ok(format!("task {} done", id))
        }
    }
}

#[tokio::test]
async fn test_bounded_concurrency_under_load() {
    let runner = Arc::new(ProbeRunner::new());
    let queue = RetryQueue::new(runner.clone(), config(3)).expect("queue construction");

    let mut handles = Vec::new();
    for id in 1u64..=20 {
        handles.push(queue.enqueue_with_limit(id, 1).await);
    }

    let results = timeout(Duration::from_secs(30), futures::future::join_all(handles))
        .await
        .expect("all handles should settle");
    for result in results {
        result.expect("every task succeeds on its retry");
    }

    queue.idle().await;
    let stats = queue.stats().await;
    assert_eq!(stats.total_enqueued, 20);
    assert_eq!(stats.total_dispatched, 20);
    assert_eq!(stats.total_completed, 20);
    assert_eq!(stats.total_abandoned, 0);
    assert_eq!(stats.total_retries, 20);
    assert_eq!(stats.peak_running, 3);
    assert!(runner.peak() <= 3, "attempt overlap exceeded the limit: {}", runner.peak());
}

// =============================================================================
// Event Stream Tests
// =============================================================================

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<QueueEvent>) -> QueueEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_events_follow_item_lifecycle() {
    let runner = Arc::new(ScriptedRunner::new(vec![
        Err(AttemptError::new("transient")),
        Ok("done".to_string()),
    ]));
    let queue = RetryQueue::new(runner, config(1)).expect("queue construction");
    let mut rx = queue.subscribe();

    let handle = queue.enqueue_with_limit(4u64, 1).await;
    assert_eq!(handle.await.expect("task should succeed"), "done");
    queue.idle().await;

    assert!(matches!(
        next_event(&mut rx).await,
        QueueEvent::Enqueued { id, retry_limit: 1, .. } if id == TaskId::new(4)
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        QueueEvent::Dispatched { id, .. } if id == TaskId::new(4)
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        QueueEvent::Retried { id, attempts_remaining: 0, .. } if id == TaskId::new(4)
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        QueueEvent::Completed { id, attempts: 2, .. } if id == TaskId::new(4)
    ));
}

#[tokio::test]
async fn test_event_logger_writes_jsonl() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_path = temp_dir.path().join("events.jsonl");

    let runner = Arc::new(ScriptedRunner::new(vec![
        Err(AttemptError::new("transient")),
        Ok("done".to_string()),
    ]));
    let queue = RetryQueue::new(runner, config(1)).expect("queue construction");
    let logger = spawn_event_logger(&queue.event_bus(), &log_path).expect("logger should start");

    let handle = queue.enqueue_with_limit(4u64, 1).await;
    assert_eq!(handle.await.expect("task should succeed"), "done");
    queue.idle().await;

    // Dropping the queue closes the bus, which stops the logger
    drop(queue);
    timeout(Duration::from_secs(5), logger)
        .await
        .expect("logger should exit after the bus closes")
        .expect("logger task should not panic");

    let entries = read_event_log(&log_path).expect("log should parse");
    let types: Vec<&str> = entries.iter().map(|e| e.event.event_type()).collect();
    assert_eq!(types, ["Enqueued", "Dispatched", "Retried", "Completed"]);
}

// =============================================================================
// CLI Tests
// =============================================================================

#[test]
fn test_cli_all_tasks_succeed() {
    use predicates::prelude::*;

    assert_cmd::Command::cargo_bin("rq")
        .expect("binary should build")
        .args([
            "--tasks",
            "4",
            "--max-concurrent",
            "2",
            "--fail-rate",
            "0.0",
            "--max-latency-ms",
            "10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("DONE:"))
        .stdout(predicate::str::contains("All 4 tasks completed"));
}

#[test]
fn test_cli_reports_abandoned_tasks() {
    use predicates::prelude::*;

    assert_cmd::Command::cargo_bin("rq")
        .expect("binary should build")
        .args([
            "--tasks",
            "2",
            "--max-concurrent",
            "1",
            "--retry-limit",
            "1",
            "--fail-rate",
            "1.0",
            "--max-latency-ms",
            "5",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED:"))
        .stdout(predicate::str::contains("tasks abandoned"));
}

#[test]
fn test_cli_rejects_zero_concurrency() {
    use predicates::prelude::*;

    assert_cmd::Command::cargo_bin("rq")
        .expect("binary should build")
        .args(["--max-concurrent", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max-concurrent"));
}

#[test]
fn test_cli_writes_event_log() {
    use predicates::prelude::*;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_path = temp_dir.path().join("events.jsonl");

    assert_cmd::Command::cargo_bin("rq")
        .expect("binary should build")
        .args([
            "--tasks",
            "2",
            "--fail-rate",
            "0.0",
            "--max-latency-ms",
            "5",
            "--event-log",
        ])
        .arg(&log_path)
        .assert()
        .success()
        // The confirmation prints only after the logger task joins cleanly
        .stdout(predicate::str::contains("Event log written to:"))
        .stderr(predicate::str::contains("Event logger task failed").not());

    let entries = read_event_log(&log_path).expect("log should parse");
    // Two tasks, no retries: an Enqueued, Dispatched, and Completed each
    assert_eq!(entries.len(), 6);
}
