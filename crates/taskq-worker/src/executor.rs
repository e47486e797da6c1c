//! Handler invocation with panic capture and optional timeout.

use crate::handler::TaskHandler;
use std::sync::Arc;
use std::time::Duration;
use taskq_core::Task;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Handler returned a result
    Success { output: Vec<u8> },
    /// Handler returned an error
    Error { message: String },
    /// Handler panicked
    Panic { message: String },
    /// Handler ran past the configured timeout
    Timeout,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// Label used for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            ExecutionResult::Success { .. } => "success",
            ExecutionResult::Error { .. } => "error",
            ExecutionResult::Panic { .. } => "panic",
            ExecutionResult::Timeout => "timeout",
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Error { message } => Some(message.clone()),
            ExecutionResult::Panic { message } => Some(format!("Task panicked: {}", message)),
            ExecutionResult::Timeout => Some("Task execution timed out".to_string()),
        }
    }
}

/// Runs handlers on their own tokio task so a panic stays contained.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    timeout: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        TaskExecutor { timeout }
    }

    /// Execute a handler against the task's payload.
    ///
    /// Always runs to completion (or timeout); never propagates a panic.
    pub async fn execute(&self, handler: Arc<dyn TaskHandler>, task: &Task) -> ExecutionResult {
        let payload = task.payload.clone();
        let mut handle: JoinHandle<Result<Vec<u8>, String>> =
            tokio::spawn(async move { handler.execute(payload).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    warn!(task_id = %task.id, "Task timed out after {:?}", limit);
                    return ExecutionResult::Timeout;
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(output)) => {
                debug!(task_id = %task.id, "Handler succeeded");
                ExecutionResult::Success { output }
            }
            Ok(Err(message)) => {
                debug!(task_id = %task.id, error = %message, "Handler returned an error");
                ExecutionResult::Error { message }
            }
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                error!(task_id = %task.id, "Handler panicked: {}", message);
                ExecutionResult::Panic { message }
            }
            Err(_) => ExecutionResult::Error {
                message: "Handler task was cancelled".to_string(),
            },
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "Unknown panic".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DelayHandler, EchoHandler, FnHandler};

    fn task(task_type: &str, payload: &[u8]) -> Task {
        Task::new("exec-test", task_type, payload.to_vec())
    }

    #[tokio::test]
    async fn test_execute_success() {
        let executor = TaskExecutor::default();
        let result = executor
            .execute(Arc::new(EchoHandler), &task("echo", b"test data"))
            .await;

        assert_eq!(
            result,
            ExecutionResult::Success {
                output: b"test data".to_vec()
            }
        );
        assert!(result.error_message().is_none());
    }

    #[tokio::test]
    async fn test_execute_error() {
        let executor = TaskExecutor::default();
        let handler = FnHandler::new(|_| Err("Handler error".to_string()));
        let result = executor.execute(Arc::new(handler), &task("err", b"")).await;

        assert!(!result.is_success());
        assert_eq!(result.outcome(), "error");
        assert_eq!(result.error_message(), Some("Handler error".to_string()));
    }

    #[tokio::test]
    async fn test_execute_panic_with_str() {
        let executor = TaskExecutor::default();
        let handler = FnHandler::new(|_| panic!("Intentional panic for testing"));
        let result = executor.execute(Arc::new(handler), &task("panic", b"")).await;

        assert_eq!(
            result,
            ExecutionResult::Panic {
                message: "Intentional panic for testing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_execute_panic_with_formatted_message() {
        let executor = TaskExecutor::default();
        let handler = FnHandler::new(|payload: Vec<u8>| panic!("bad payload of {} bytes", payload.len()));
        let result = executor.execute(Arc::new(handler), &task("panic", b"abc")).await;

        assert_eq!(
            result.error_message(),
            Some("Task panicked: bad payload of 3 bytes".to_string())
        );
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let executor = TaskExecutor::new(Some(Duration::from_millis(50)));
        let result = executor
            .execute(Arc::new(DelayHandler::default()), &task("delay", b"2000"))
            .await;

        assert_eq!(result, ExecutionResult::Timeout);
    }

    #[tokio::test]
    async fn test_timeout_interrupts_blocking_fn_handler() {
        let executor = TaskExecutor::new(Some(Duration::from_millis(50)));
        let handler = FnHandler::new(|payload| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(payload)
        });

        let start = tokio::time::Instant::now();
        let result = executor.execute(Arc::new(handler), &task("blocking", b"")).await;

        assert_eq!(result, ExecutionResult::Timeout);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_fast_handler_beats_timeout() {
        let executor = TaskExecutor::new(Some(Duration::from_secs(2)));
        let result = executor
            .execute(Arc::new(DelayHandler::default()), &task("delay", b"10"))
            .await;

        assert_eq!(
            result,
            ExecutionResult::Success {
                output: b"waited 10ms".to_vec()
            }
        );
    }
}
