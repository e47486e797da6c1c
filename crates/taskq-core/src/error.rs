use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing became available before the dequeue timeout elapsed.
    #[error("Queue empty: no task available before timeout")]
    QueueEmpty,

    #[error("Queue is closed")]
    Closed,

    #[error("Task not in flight: {0}")]
    TaskNotInFlight(String),

    #[error("Task already queued or in flight: {0}")]
    DuplicateTask(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Payload size exceeds maximum allowed size of {max} bytes (got {actual})")]
    PayloadTooLarge { max: usize, actual: usize },
}

impl QueueError {
    /// Whether the caller should simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::QueueEmpty)
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
