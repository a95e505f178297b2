//! Queue error types

use thiserror::Error;

use super::item::TaskId;

/// Errors surfaced by the queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("task {id} abandoned after {attempts} failed attempts")]
    Abandoned { id: TaskId, attempts: u32 },

    #[error("queue shut down before task {id} settled")]
    Shutdown { id: TaskId },
}

impl QueueError {
    /// Check if this is a terminal retry-exhaustion rejection
    pub fn is_abandoned(&self) -> bool {
        matches!(self, QueueError::Abandoned { .. })
    }

    /// Get the task id this error refers to, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            QueueError::Abandoned { id, .. } | QueueError::Shutdown { id } => Some(*id),
            QueueError::ZeroConcurrency => None,
        }
    }
}
