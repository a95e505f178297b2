//! RetryQueue - bounded-concurrency task queue with per-task retry
//!
//! Work items are admitted into execution through a single gate that caps how
//! many run at once. Each item carries its own retry budget and keeps its
//! concurrency slot across attempts until it resolves or is abandoned.
//!
//! # Core Concepts
//!
//! - **One Admission Gate**: Dispatch happens in exactly one place, after every enqueue and every terminal completion
//! - **Slot Held Across Retries**: The running counter moves once at dispatch and once at completion, never per attempt
//! - **FIFO Dispatch**: Enqueue order is dispatch order; duplicate ids are independent items
//! - **Settled Exactly Once**: Every handle resolves with the task's value or an error naming the abandoned task
//!
//! # Modules
//!
//! - [`queue`] - The retry queue, its handles, and lifecycle state
//! - [`runner`] - TaskRunner trait the queue drives
//! - [`events`] - Queue event bus and JSONL event logger
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod queue;
pub mod runner;

// Re-export commonly used types
pub use config::QueueConfig;
pub use events::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventLogEntry, EventLogger, QueueEvent, read_event_log, spawn_event_logger,
};
pub use queue::{ItemStatus, QueueEntry, QueueError, QueueState, QueueStats, RetryQueue, TaskHandle, TaskId};
pub use runner::{AttemptError, FlakyRunner, TaskRunner};
