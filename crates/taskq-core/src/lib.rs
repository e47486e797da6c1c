//! Core data structures for the in-process task queue: the task model,
//! priorities, queue counters and the priority queue itself.

mod error;
mod priority;
mod queue;
mod stats;
mod task;

pub use error::{QueueError, Result};
pub use priority::Priority;
pub use queue::{PriorityQueue, QueueConfig};
pub use stats::{Stats, StatsSnapshot};
pub use task::{Task, TaskBuilder, TaskId, TaskPayload, TaskStatus, TaskType, DEFAULT_MAX_RETRIES};

pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MB
