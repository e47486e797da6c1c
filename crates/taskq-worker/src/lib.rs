//! Task Queue Worker
//!
//! Worker pool that executes tasks from an in-process [`PriorityQueue`].
//!
//! # Features
//! - Fixed number of concurrent worker loops on the tokio runtime
//! - Pluggable task handlers registered by type name, also while running
//! - Panic capture and optional timeout per handler invocation
//! - Exponential backoff retry via ack/nack
//! - Graceful shutdown that lets in-flight handlers finish
//! - Prometheus metrics
//!
//! [`PriorityQueue`]: taskq_core::PriorityQueue

pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod metrics;
pub mod pool;
pub mod retry;

pub use config::{PoolConfig, TaskQueueConfig};
pub use error::PoolError;
pub use executor::{ExecutionResult, TaskExecutor};
pub use handler::{DelayHandler, EchoHandler, FnHandler, HandlerRegistry, TaskHandler, TaskResult};
pub use metrics::PoolMetrics;
pub use pool::WorkerPool;
pub use retry::{calculate_backoff, RetryPolicy};
