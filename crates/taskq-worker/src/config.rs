use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use taskq_core::QueueConfig;

/// Worker pool settings. Durations are expressed in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent worker loops
    pub workers: usize,
    /// How long each dequeue waits before re-checking for cancellation
    pub poll_interval_ms: u64,
    /// Per-invocation handler timeout (absent = unbounded)
    pub handler_timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: 4,
            poll_interval_ms: 100,
            handler_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        PoolConfig {
            workers,
            ..PoolConfig::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

/// Combined queue and pool configuration, as loaded from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    pub queue: QueueConfig,
    pub pool: PoolConfig,
}

impl TaskQueueConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: TaskQueueConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }
}
