use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Result type for task handlers
pub type TaskResult = Result<Vec<u8>, String>;

/// Trait for task handlers
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task with the given payload
    async fn execute(&self, payload: Vec<u8>) -> TaskResult;
}

/// Adapts a plain function or closure into a [`TaskHandler`].
///
/// The function runs on tokio's blocking pool, so CPU-bound or sleeping
/// handlers never stall the worker loops. A panic inside it is re-raised on
/// the calling task.
pub struct FnHandler<F> {
    func: Arc<F>,
}

impl<F> FnHandler<F>
where
    F: Fn(Vec<u8>) -> TaskResult + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        FnHandler { func: Arc::new(func) }
    }
}

#[async_trait]
impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> TaskResult + Send + Sync + 'static,
{
    async fn execute(&self, payload: Vec<u8>) -> TaskResult {
        let func = Arc::clone(&self.func);
        match tokio::task::spawn_blocking(move || func(payload)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(format!("Blocking handler did not finish: {}", e)),
        }
    }
}

/// Registry of task handlers by task type.
///
/// Lookups take a read lock, so registering while workers are running is safe.
/// A later registration for the same type replaces the earlier one.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task handler for a specific task type
    pub fn register<H: TaskHandler + 'static>(&self, task_type: impl Into<String>, handler: H) {
        self.register_arc(task_type, Arc::new(handler));
    }

    pub fn register_arc(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(task_type.into(), handler);
    }

    /// Register a synchronous closure as a handler
    pub fn register_fn<F>(&self, task_type: impl Into<String>, func: F)
    where
        F: Fn(Vec<u8>) -> TaskResult + Send + Sync + 'static,
    {
        self.register(task_type, FnHandler::new(func));
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(task_type).cloned()
    }

    pub fn has_handler(&self, task_type: &str) -> bool {
        self.handlers.read().contains_key(task_type)
    }

    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }
}

/// Demo handler: the result is the payload itself
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn execute(&self, payload: Vec<u8>) -> TaskResult {
        Ok(payload)
    }
}

/// Demo handler whose payload is a decimal millisecond count to wait for.
///
/// Waits are clamped to `max_delay`; a payload that is not a number fails the
/// attempt. Returns the time actually waited, e.g. `waited 40ms`.
pub struct DelayHandler {
    max_delay: Duration,
}

impl DelayHandler {
    pub fn new(max_delay: Duration) -> Self {
        DelayHandler { max_delay }
    }

    fn parse_delay(&self, payload: &[u8]) -> Result<Duration, String> {
        let text = std::str::from_utf8(payload).map_err(|e| format!("payload is not UTF-8: {}", e))?;
        let ms: u64 = text
            .trim()
            .parse()
            .map_err(|_| format!("expected a millisecond count, got {:?}", text))?;
        Ok(Duration::from_millis(ms).min(self.max_delay))
    }
}

impl Default for DelayHandler {
    fn default() -> Self {
        DelayHandler::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl TaskHandler for DelayHandler {
    async fn execute(&self, payload: Vec<u8>) -> TaskResult {
        let delay = self.parse_delay(&payload)?;
        tokio::time::sleep(delay).await;
        Ok(format!("waited {}ms", delay.as_millis()).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_handler() {
        let payload = b"test data".to_vec();
        let result = EchoHandler.execute(payload.clone()).await.unwrap();
        assert_eq!(result, payload);
    }

    #[tokio::test]
    async fn test_registry() {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler);

        assert!(registry.has_handler("echo"));
        assert!(!registry.has_handler("unknown"));

        let handler = registry.get("echo").unwrap();
        assert_eq!(handler.execute(b"test".to_vec()).await.unwrap(), b"test");
    }

    #[tokio::test]
    async fn test_later_registration_overwrites() {
        let registry = HandlerRegistry::new();
        registry.register_fn("job", |_| Ok(b"first".to_vec()));
        registry.register_fn("job", |_| Ok(b"second".to_vec()));

        let handler = registry.get("job").unwrap();
        assert_eq!(handler.execute(vec![]).await.unwrap(), b"second");
        assert_eq!(registry.task_types(), vec!["job".to_string()]);
    }

    #[tokio::test]
    async fn test_delay_handler_reports_wait() {
        let handler = DelayHandler::default();
        assert_eq!(handler.execute(b" 15\n".to_vec()).await.unwrap(), b"waited 15ms");
    }

    #[tokio::test]
    async fn test_delay_handler_clamps_to_max() {
        let handler = DelayHandler::new(Duration::from_millis(5));
        assert_eq!(handler.execute(b"60000".to_vec()).await.unwrap(), b"waited 5ms");
    }

    #[tokio::test]
    async fn test_delay_handler_rejects_non_numeric_payload() {
        let err = DelayHandler::default().execute(b"soon".to_vec()).await.unwrap_err();
        assert!(err.contains("millisecond count"), "{}", err);
    }

    #[tokio::test]
    async fn test_blocking_fn_does_not_stall_runtime() {
        let handler = FnHandler::new(|payload| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(payload)
        });

        let start = tokio::time::Instant::now();
        let running = tokio::spawn(async move { handler.execute(b"slow".to_vec()).await });

        // Single-threaded runtime: this timer only fires if the handler is off-thread
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() < Duration::from_millis(200));

        assert_eq!(running.await.unwrap().unwrap(), b"slow");
    }

    #[tokio::test]
    async fn test_fn_handler_panic_is_reraised() {
        let handler = FnHandler::new(|_| panic!("bad input"));
        let join = tokio::spawn(async move { handler.execute(vec![]).await }).await;

        let panic = join.unwrap_err().into_panic();
        assert_eq!(panic.downcast_ref::<&str>(), Some(&"bad input"));
    }

    #[tokio::test]
    async fn test_fn_handler_error() {
        let registry = HandlerRegistry::new();
        registry.register_fn("fail", |_| Err("boom".to_string()));

        let handler = registry.get("fail").unwrap();
        assert_eq!(handler.execute(vec![]).await, Err("boom".to_string()));
    }
}
