//! Fixed-size pool of worker loops consuming from a [`PriorityQueue`].

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::executor::{ExecutionResult, TaskExecutor};
use crate::handler::{HandlerRegistry, TaskHandler, TaskResult};
use crate::metrics::PoolMetrics;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskq_core::{PriorityQueue, QueueError, Task};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct RunningPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Runs `workers` concurrent dequeue, dispatch and resolve loops.
///
/// Each loop waits on the queue, runs the handler registered for the task's
/// type, then acks on success or nacks with exponential backoff on error,
/// panic, timeout or a missing handler.
pub struct WorkerPool {
    queue: Arc<PriorityQueue>,
    config: PoolConfig,
    registry: HandlerRegistry,
    metrics: Arc<PoolMetrics>,
    running: Option<RunningPool>,
}

impl WorkerPool {
    pub fn new(queue: Arc<PriorityQueue>, num_workers: usize) -> Self {
        Self::with_config(queue, PoolConfig::with_workers(num_workers))
    }

    pub fn with_config(queue: Arc<PriorityQueue>, config: PoolConfig) -> Self {
        WorkerPool {
            queue,
            config,
            registry: HandlerRegistry::new(),
            metrics: Arc::new(PoolMetrics::default()),
            running: None,
        }
    }

    /// Register a handler for a task type. Safe while the pool is running.
    pub fn register_handler<H: TaskHandler + 'static>(&self, task_type: impl Into<String>, handler: H) {
        let task_type = task_type.into();
        debug!(task_type = %task_type, "Registered handler");
        self.registry.register(task_type, handler);
    }

    pub fn register_fn<F>(&self, task_type: impl Into<String>, func: F)
    where
        F: Fn(Vec<u8>) -> TaskResult + Send + Sync + 'static,
    {
        self.registry.register_fn(task_type, func);
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<PriorityQueue> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Launch the worker loops.
    ///
    /// Cancelling `cancel` stops workers from taking new tasks, as does
    /// [`stop`](Self::stop). With zero workers this does nothing.
    pub fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        if self.running.is_some() {
            return Err(PoolError::AlreadyRunning);
        }

        let cancel = cancel.child_token();
        let executor = TaskExecutor::new(self.config.handler_timeout());
        let handles = (0..self.config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: self.queue.clone(),
                    registry: self.registry.clone(),
                    executor: executor.clone(),
                    retry: self.config.retry,
                    poll_interval: self.config.poll_interval(),
                    metrics: self.metrics.clone(),
                };
                tokio::spawn(worker.run(cancel.clone()))
            })
            .collect();

        info!(workers = self.config.workers, "Worker pool started");
        self.running = Some(RunningPool { cancel, handles });
        Ok(())
    }

    /// Stop taking new tasks and wait for every worker to finish the task it holds.
    ///
    /// No-op if the pool is not running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        info!("Stopping worker pool, waiting for in-flight tasks");
        running.cancel.cancel();

        let mut first_failure = None;
        for (worker, handle) in running.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker, "Worker terminated abnormally: {}", e);
                first_failure.get_or_insert(PoolError::WorkerTerminated {
                    worker,
                    reason: e.to_string(),
                });
            }
        }

        self.metrics.update_queue(&self.queue.stats());
        info!("Worker pool stopped");
        first_failure.map_or(Ok(()), Err)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// State owned by one worker loop
struct Worker {
    id: usize,
    queue: Arc<PriorityQueue>,
    registry: HandlerRegistry,
    executor: TaskExecutor,
    retry: RetryPolicy,
    poll_interval: Duration,
    metrics: Arc<PoolMetrics>,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        debug!(worker = self.id, "Worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.queue.dequeue(self.poll_interval) => next,
            };

            match next {
                // A received task always runs to completion, even if cancelled meanwhile
                Ok(task) => self.process(task).await,
                // A zero poll interval returns without awaiting; let the runtime run
                Err(QueueError::QueueEmpty) => tokio::task::yield_now().await,
                Err(QueueError::Closed) => {
                    // In-flight tasks elsewhere may still be retried
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => error!(worker = self.id, "Dequeue failed: {}", e),
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, task: Task) {
        let Some(handler) = self.registry.get(&task.task_type) else {
            warn!(task_id = %task.id, task_type = %task.task_type, "No handler registered for task type");
            self.metrics.observe_execution(&task.task_type, "unhandled", 0.0);
            self.retry_later(&task, "no handler registered");
            tokio::task::yield_now().await;
            return;
        };

        debug!(worker = self.id, task_id = %task.id, task_type = %task.task_type, "Executing task");
        self.metrics.tasks_in_flight.inc();
        let started = Instant::now();
        let result = self.executor.execute(handler, &task).await;
        self.metrics.tasks_in_flight.dec();
        self.metrics
            .observe_execution(&task.task_type, result.outcome(), started.elapsed().as_secs_f64());

        match result {
            ExecutionResult::Success { .. } => {
                if let Err(e) = self.queue.ack(&task.id) {
                    warn!(task_id = %task.id, "Failed to ack task: {}", e);
                }
            }
            failure => {
                let reason = failure.error_message().unwrap_or_default();
                self.retry_later(&task, &reason);
            }
        }

        self.metrics.update_queue(&self.queue.stats());
    }

    fn retry_later(&self, task: &Task, reason: &str) {
        let delay = self.retry.calculate_delay(task.attempts);
        warn!(
            task_id = %task.id,
            attempt = task.attempts + 1,
            max_retries = task.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Task attempt failed: {}",
            reason
        );

        if let Err(e) = self.queue.nack(&task.id, delay) {
            warn!(task_id = %task.id, "Failed to nack task: {}", e);
        }
    }
}
