//! Priority-ordered task queue with blocking dequeue and ack/nack resolution.

use crate::{Priority, QueueError, Result, Stats, StatsSnapshot, Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stand-in due time for delays too large to represent as an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Queue tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Consecutive dequeues that may pass over an older, lower-priority task
    /// before that task is served. 0 disables the fairness pass.
    pub fairness_interval: u32,

    /// Permanently failed tasks kept for inspection (oldest evicted first)
    pub dead_letter_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            fairness_interval: 8,
            dead_letter_capacity: 1000,
        }
    }
}

/// A ready task together with its arrival order
struct QueuedTask {
    seq: u64,
    task: Task,
}

/// A nacked task waiting out its backoff
struct DelayedTask {
    ready_at: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest due time on top of the max-heap
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    /// One FIFO bucket per priority; a bucket is removed as soon as it empties
    buckets: BTreeMap<Priority, VecDeque<QueuedTask>>,
    delayed: BinaryHeap<DelayedTask>,
    in_flight: HashMap<TaskId, Task>,
    /// Every id that is pending, delayed or in flight
    live_ids: HashSet<TaskId>,
    dead_letters: VecDeque<Task>,
    next_seq: u64,
    bypassed: u32,
    closed: bool,
}

impl QueueState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn push_ready(&mut self, task: Task) {
        let seq = self.next_seq();
        self.buckets
            .entry(task.priority)
            .or_default()
            .push_back(QueuedTask { seq, task });
    }

    fn push_delayed(&mut self, ready_at: Instant, task: Task) {
        let seq = self.next_seq();
        self.delayed.push(DelayedTask { ready_at, seq, task });
    }

    /// Move every delayed task whose backoff has elapsed into its bucket
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|d| d.ready_at <= now) {
            if let Some(due) = self.delayed.pop() {
                self.push_ready(due.task);
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.peek().map(|d| d.ready_at)
    }

    fn pending_len(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }

    /// Pick the next ready task.
    ///
    /// The highest non-empty bucket wins, except that after `fairness_interval`
    /// consecutive dequeues passing over an older task in a lower bucket, the
    /// oldest such task is served instead.
    fn take_next(&mut self, fairness_interval: u32) -> Option<Task> {
        let (top_priority, top_seq) = {
            let (priority, bucket) = self.buckets.iter().next_back()?;
            (*priority, bucket.front()?.seq)
        };

        let oldest_below = self
            .buckets
            .range(..top_priority)
            .filter_map(|(priority, bucket)| bucket.front().map(|q| (q.seq, *priority)))
            .min();

        let chosen = match oldest_below {
            Some((seq, priority)) if seq < top_seq => {
                if fairness_interval > 0 && self.bypassed >= fairness_interval {
                    self.bypassed = 0;
                    priority
                } else {
                    self.bypassed += 1;
                    top_priority
                }
            }
            _ => {
                self.bypassed = 0;
                top_priority
            }
        };

        let bucket = self.buckets.get_mut(&chosen)?;
        let queued = bucket.pop_front()?;
        if bucket.is_empty() {
            self.buckets.remove(&chosen);
        }
        Some(queued.task)
    }

    fn record_dead_letter(&mut self, task: Task, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.dead_letters.len() >= capacity {
            self.dead_letters.pop_front();
        }
        self.dead_letters.push_back(task);
    }
}

/// Thread-safe, priority-ordered holding area for tasks.
///
/// Tasks are served highest priority first and FIFO within a priority. A task
/// returned by [`dequeue`](Self::dequeue) is in flight until it is resolved
/// with [`ack`](Self::ack) or [`nack`](Self::nack); it cannot be handed to a
/// second consumer in the meantime.
pub struct PriorityQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    stats: Stats,
    available: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        PriorityQueue {
            config,
            state: Mutex::new(QueueState::default()),
            stats: Stats::new(),
            available: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Insert a task into the bucket for its priority and wake one waiting consumer.
    pub fn enqueue(&self, mut task: Task) -> Result<()> {
        task.validate()?;

        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.live_ids.contains(&task.id) {
                return Err(QueueError::DuplicateTask(task.id));
            }

            debug!(task_id = %task.id, task_type = %task.task_type, priority = %task.priority, "Enqueued task");

            task.mark_pending();
            state.live_ids.insert(task.id.clone());
            state.push_ready(task);
            self.stats.increment_queue_length();
        }

        self.available.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for the highest-priority ready task.
    ///
    /// The returned task is marked running and recorded as in flight. Returns
    /// [`QueueError::QueueEmpty`] when nothing became ready in time. Dropping
    /// the future before it completes never loses a task. A timeout too large
    /// to represent (such as `Duration::MAX`) waits without a deadline.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Task> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before inspecting state so an enqueue in between still wakes us
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.state.lock();
                let now = Instant::now();
                state.promote_due(now);

                if let Some(mut task) = state.take_next(self.config.fairness_interval) {
                    task.mark_running();
                    state.in_flight.insert(task.id.clone(), task.clone());
                    debug!(task_id = %task.id, attempts = task.attempts, "Dequeued task");
                    return Ok(task);
                }

                if state.closed && state.delayed.is_empty() {
                    return Err(QueueError::Closed);
                }
                if deadline.is_some_and(|deadline| now >= deadline) {
                    return Err(QueueError::QueueEmpty);
                }

                match (state.next_due(), deadline) {
                    (Some(due), Some(deadline)) => Some(due.min(deadline)),
                    (due, deadline) => due.or(deadline),
                }
            };

            // Woken by a producer, a close, or the next due time; re-check either way
            match wake_at {
                Some(wake_at) => {
                    let _ = tokio::time::timeout_at(wake_at, notified).await;
                }
                None => notified.await,
            }
        }
    }

    /// Non-blocking variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Result<Task> {
        let mut state = self.state.lock();
        state.promote_due(Instant::now());

        match state.take_next(self.config.fairness_interval) {
            Some(mut task) => {
                task.mark_running();
                state.in_flight.insert(task.id.clone(), task.clone());
                Ok(task)
            }
            None if state.closed && state.delayed.is_empty() => Err(QueueError::Closed),
            None => Err(QueueError::QueueEmpty),
        }
    }

    /// Resolve an in-flight task as completed.
    pub fn ack(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let task = state
            .in_flight
            .remove(id)
            .ok_or_else(|| QueueError::TaskNotInFlight(id.to_string()))?;
        state.live_ids.remove(id);
        self.stats.record_completed();

        debug!(task_id = %task.id, attempts = task.attempts, "Acked task");
        Ok(())
    }

    /// Resolve an in-flight task as failed for this attempt.
    ///
    /// The task becomes eligible again once `delay` has elapsed, unless this was
    /// its last allowed attempt, in which case it is failed permanently.
    pub fn nack(&self, id: &str, delay: Duration) -> Result<()> {
        let now = Instant::now();
        let ready_at = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);

        let retried = {
            let mut state = self.state.lock();
            let mut task = state
                .in_flight
                .remove(id)
                .ok_or_else(|| QueueError::TaskNotInFlight(id.to_string()))?;
            task.attempts += 1;

            if task.can_retry() {
                debug!(task_id = %task.id, attempts = task.attempts, delay_ms = delay.as_millis() as u64, "Scheduled retry");
                task.mark_pending();
                self.stats.increment_retried();
                if delay.is_zero() {
                    state.push_ready(task);
                } else {
                    state.push_delayed(ready_at, task);
                }
                true
            } else {
                warn!(task_id = %task.id, task_type = %task.task_type, attempts = task.attempts, "Task failed permanently, retries exhausted");
                task.status = TaskStatus::Failed;
                state.live_ids.remove(id);
                self.stats.record_failed();
                state.record_dead_letter(task, self.config.dead_letter_capacity);
                false
            }
        };

        if retried {
            if delay.is_zero() {
                self.available.notify_one();
            } else {
                // Sleeping consumers must recompute their wake time
                self.available.notify_waiters();
            }
        }
        Ok(())
    }

    /// Refuse further enqueues and wake every blocked consumer.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        info!("Queue closed");
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Consistent snapshot of the queue counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Pending, delayed and in-flight tasks
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.pending_len() + state.delayed.len() + state.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending_len()
    }

    pub fn delayed_len(&self) -> usize {
        self.state.lock().delayed.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.state.lock().in_flight.contains_key(id)
    }

    /// Ready task count per tier as (high, normal, low)
    pub fn depth_by_tier(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        let mut high = 0;
        let mut normal = 0;
        let mut low = 0;

        for (priority, bucket) in &state.buckets {
            if priority.is_high() {
                high += bucket.len();
            } else if priority.is_normal() {
                normal += bucket.len();
            } else {
                low += bucket.len();
            }
        }

        (high, normal, low)
    }

    pub fn dead_letters(&self) -> Vec<Task> {
        self.state.lock().dead_letters.iter().cloned().collect()
    }

    pub fn drain_dead_letters(&self) -> Vec<Task> {
        self.state.lock().dead_letters.drain(..).collect()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
