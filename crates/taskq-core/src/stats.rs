use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Pending, delayed and in-flight tasks
    pub queue_length: i64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Nacks that scheduled another attempt
    pub retried_tasks: u64,
}

/// Thread-safe queue counters.
///
/// Every mutation goes through one mutex so concurrent updates from different
/// workers are never lost, and `snapshot` never observes a half-applied change.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<StatsSnapshot>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queue_length(&self) {
        self.inner.lock().queue_length += 1;
    }

    pub fn decrement_queue_length(&self) {
        self.inner.lock().queue_length -= 1;
    }

    pub fn increment_completed(&self) {
        self.inner.lock().completed_tasks += 1;
    }

    pub fn increment_failed(&self) {
        self.inner.lock().failed_tasks += 1;
    }

    pub fn increment_retried(&self) {
        self.inner.lock().retried_tasks += 1;
    }

    /// Ack bookkeeping as a single update
    pub fn record_completed(&self) {
        let mut stats = self.inner.lock();
        stats.queue_length -= 1;
        stats.completed_tasks += 1;
    }

    /// Retry exhaustion bookkeeping as a single update
    pub fn record_failed(&self) {
        let mut stats = self.inner.lock();
        stats.queue_length -= 1;
        stats.failed_tasks += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_stats_start_at_zero() {
        assert_eq!(Stats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_record_helpers() {
        let stats = Stats::new();
        stats.increment_queue_length();
        stats.increment_queue_length();
        stats.record_completed();
        stats.record_failed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.queue_length, 0);
        assert_eq!(snapshot.completed_tasks, 1);
        assert_eq!(snapshot.failed_tasks, 1);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(Stats::new());
        let mut handles = Vec::new();

        for i in 0..400 {
            let stats = stats.clone();
            handles.push(thread::spawn(move || match i % 4 {
                0 => stats.increment_queue_length(),
                1 => stats.decrement_queue_length(),
                2 => stats.increment_completed(),
                _ => stats.increment_failed(),
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.queue_length, 0);
        assert_eq!(snapshot.completed_tasks, 100);
        assert_eq!(snapshot.failed_tasks, 100);
    }
}
