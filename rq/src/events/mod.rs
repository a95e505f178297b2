//! Event system for queue observability
//!
//! Every transition in an item's lifecycle emits an event to a broadcast
//! bus; consumers subscribe to it. The queue is the only emitter.
//!
//! ```text
//!   RetryQueue ──emit──▶ EventBus (tokio::sync::broadcast)
//!                            │
//!              ┌─────────────┼─────────────┐
//!              ▼             ▼             ▼
//!         EventLogger    test probes    caller code
//!          (.jsonl)
//! ```
//!
//! Event order on the channel is emission order, so a subscriber sees a
//! well-formed lifecycle per item: `Enqueued`, `Dispatched`, zero or more
//! `Retried`, then `Completed` or `Abandoned`.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use logger::{EventLogger, read_event_log, spawn_event_logger};
pub use types::{EventLogEntry, QueueEvent};
