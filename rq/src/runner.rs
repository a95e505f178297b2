//! TaskRunner trait definition

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::queue::TaskId;

/// Failure signal from a single run attempt
///
/// The queue never inspects the reason beyond retry accounting; it is
/// carried for logs and events only.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct AttemptError {
    reason: String,
}

impl AttemptError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Stateless task executor - each call is one attempt
///
/// This is the capability the queue drives. An invocation performs exactly
/// one attempt for the given id and reports success or failure; the queue
/// owns all retry policy. Implementations are expected to complete in
/// bounded time - the queue does not enforce a per-attempt timeout.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    type Output: Send + 'static;

    /// Perform one attempt of the work identified by `id`
    async fn run(&self, id: TaskId) -> Result<Self::Output, AttemptError>;
}

/// Runner with random latency and failure injection
///
/// Sleeps a uniform random duration up to `max_latency`, then fails with
/// probability `fail_rate`. Used by the `rq` binary to exercise the queue.
pub struct FlakyRunner {
    fail_rate: f64,
    max_latency: Duration,
}

impl FlakyRunner {
    pub fn new(fail_rate: f64, max_latency: Duration) -> Self {
        debug!(fail_rate, ?max_latency, "FlakyRunner::new: called");
        Self { fail_rate, max_latency }
    }
}

#[async_trait]
impl TaskRunner for FlakyRunner {
    type Output = String;

    async fn run(&self, id: TaskId) -> Result<String, AttemptError> {
        // Draw before sleeping: ThreadRng cannot be held across an await
        let (latency, roll) = {
            let mut rng = rand::rng();
            (self.max_latency.mul_f64(rng.random::<f64>()), rng.random::<f64>())
        };

        debug!(%id, latency_ms = latency.as_millis() as u64, "FlakyRunner::run: executing");
        tokio::time::sleep(latency).await;

        if roll < self.fail_rate {
            debug!(%id, "FlakyRunner::run: injected failure");
            Err(AttemptError::new(format!("task {} hit an injected failure", id)))
        } else {
            Ok(format!("task {} finished in {:.2}s", id, latency.as_secs_f64()))
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock task runner for unit tests
    ///
    /// Outcomes are consumed in invocation order across all items; an
    /// exhausted script fails the attempt.
    pub struct MockTaskRunner {
        outcomes: Vec<Result<String, AttemptError>>,
        call_count: AtomicUsize,
    }

    impl MockTaskRunner {
        pub fn new(outcomes: Vec<Result<String, AttemptError>>) -> Self {
            debug!(outcome_count = %outcomes.len(), "MockTaskRunner::new: called");
            Self {
                outcomes,
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskRunner for MockTaskRunner {
        type Output = String;

        async fn run(&self, id: TaskId) -> Result<String, AttemptError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%id, %idx, "MockTaskRunner::run: fetching outcome");
            self.outcomes
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Err(AttemptError::new("no more scripted outcomes")))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_runner_returns_scripted_outcomes() {
            let runner = MockTaskRunner::new(vec![
                Ok("first".to_string()),
                Err(AttemptError::new("boom")),
            ]);

            assert_eq!(runner.run(TaskId::new(1)).await.unwrap(), "first");
            assert_eq!(runner.run(TaskId::new(1)).await.unwrap_err().reason(), "boom");
            assert_eq!(runner.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_runner_fails_when_exhausted() {
            let runner = MockTaskRunner::new(vec![]);
            assert!(runner.run(TaskId::new(1)).await.is_err());
            assert_eq!(runner.call_count(), 1);
        }
    }
}
