//! Bounded-concurrency queue with per-task retry
//!
//! The queue owns all lifecycle state: a FIFO of pending items, the set of
//! running items, and counters. Admission happens in exactly one place,
//! triggered after every enqueue and every terminal completion.

mod core;
mod error;
mod item;

pub use self::core::RetryQueue;
pub use error::QueueError;
pub use item::{ItemStatus, QueueEntry, QueueState, QueueStats, TaskHandle, TaskId};
