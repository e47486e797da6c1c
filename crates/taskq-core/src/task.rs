use crate::{Priority, QueueError, Result, MAX_PAYLOAD_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Producer-assigned task identifier
pub type TaskId = String;

/// Task type name, selects the handler
pub type TaskType = String;

/// Task payload (opaque bytes)
pub type TaskPayload = Vec<u8>;

/// Default number of attempts before a task is permanently failed
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Task status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be handed to a worker
    Pending,
    /// Handed to exactly one worker, awaiting ack/nack
    Running,
    Completed,
    /// Retries exhausted
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique per logical unit of work
    pub id: TaskId,

    /// Task type name (e.g., "send_email", "resize_image")
    pub task_type: TaskType,

    /// Opaque payload, decoded by the handler
    pub payload: TaskPayload,

    /// Higher value is served first
    pub priority: Priority,

    pub status: TaskStatus,

    /// Failed attempts so far; incremented by every nack
    pub attempts: u32,

    /// Attempts allowed before the task is permanently failed
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,

    /// Set when a dequeue hands the task to a worker
    pub started_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with default priority and retry budget
    pub fn new(
        id: impl Into<TaskId>,
        task_type: impl Into<TaskType>,
        payload: TaskPayload,
    ) -> Self {
        Task {
            id: id.into(),
            task_type: task_type.into(),
            payload,
            priority: Priority::default(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
        }
    }

    pub fn builder(task_type: impl Into<TaskType>, payload: TaskPayload) -> TaskBuilder {
        TaskBuilder::new(task_type.into(), payload)
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check the task is acceptable to the queue
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(QueueError::InvalidTask("task id must not be empty".to_string()));
        }
        if self.task_type.is_empty() {
            return Err(QueueError::InvalidTask(format!(
                "task {} has an empty task type",
                self.id
            )));
        }
        check_payload(&self.payload)
    }

    /// Whether another attempt is allowed after the current number of failures
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_pending(&mut self) {
        self.status = TaskStatus::Pending;
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(QueueError::PayloadTooLarge {
            max: MAX_PAYLOAD_SIZE,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Builder for tasks with custom configuration
pub struct TaskBuilder {
    id: Option<TaskId>,
    task_type: TaskType,
    payload: TaskPayload,
    priority: Priority,
    max_retries: u32,
}

impl TaskBuilder {
    pub fn new(task_type: TaskType, payload: TaskPayload) -> Self {
        TaskBuilder {
            id: None,
            task_type,
            payload,
            priority: Priority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Use a producer-chosen id instead of a generated one
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Result<Task> {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let task = Task::new(id, self.task_type, self.payload)
            .with_priority(self.priority)
            .with_max_retries(self.max_retries);
        task.validate()?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("t-1", "send_email", b"payload".to_vec());

        assert_eq!(task.id, "t-1");
        assert_eq!(task.task_type, "send_email");
        assert_eq!(task.payload, b"payload");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::normal());
        assert_eq!(task.attempts, 0);
        assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_task_builder() {
        let task = Task::builder("resize", vec![1, 2, 3])
            .priority(Priority::high())
            .max_retries(5)
            .build()
            .unwrap();

        assert_eq!(task.priority, Priority::high());
        assert_eq!(task.max_retries, 5);
        // generated ids are UUIDs
        assert!(Uuid::parse_str(&task.id).is_ok());

        let named = Task::builder("resize", vec![]).id("fixed").build().unwrap();
        assert_eq!(named.id, "fixed");
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Task::new("", "t", vec![]).validate(),
            Err(QueueError::InvalidTask(_))
        ));
        assert!(matches!(
            Task::new("id", "", vec![]).validate(),
            Err(QueueError::InvalidTask(_))
        ));
        assert!(Task::new("id", "t", vec![]).validate().is_ok());
    }

    #[test]
    fn test_payload_size_limit() {
        let result = Task::builder("big", vec![0u8; MAX_PAYLOAD_SIZE + 1]).build();

        match result {
            Err(QueueError::PayloadTooLarge { max, actual }) => {
                assert_eq!(max, MAX_PAYLOAD_SIZE);
                assert_eq!(actual, MAX_PAYLOAD_SIZE + 1);
            }
            other => panic!("Expected PayloadTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_can_retry() {
        let mut task = Task::new("r", "t", vec![]).with_max_retries(2);
        assert!(task.can_retry());
        task.attempts = 1;
        assert!(task.can_retry());
        task.attempts = 2;
        assert!(!task.can_retry());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(TaskStatus::Running.as_str(), "running");
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
