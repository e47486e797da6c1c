use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use taskq_core::StatsSnapshot;

/// Prometheus metrics for the worker pool
pub struct PoolMetrics {
    pub registry: Registry,

    /// Handler outcomes by status and type
    pub tasks_total: IntCounterVec,

    pub task_processing_duration: HistogramVec,

    pub queue_length: IntGauge,
    pub tasks_in_flight: IntGauge,
}

impl PoolMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_total = IntCounterVec::new(
            Opts::new("tq_tasks_total", "Total handler invocations by outcome and type"),
            &["status", "task_type"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let task_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "tq_task_processing_duration_seconds",
                "Task processing duration in seconds",
            ),
            &["task_type"],
        )?;
        registry.register(Box::new(task_processing_duration.clone()))?;

        let queue_length = IntGauge::new("tq_queue_length", "Pending, delayed and in-flight tasks")?;
        registry.register(Box::new(queue_length.clone()))?;

        let tasks_in_flight = IntGauge::new("tq_tasks_in_flight", "Handler invocations in progress")?;
        registry.register(Box::new(tasks_in_flight.clone()))?;

        Ok(PoolMetrics {
            registry,
            tasks_total,
            task_processing_duration,
            queue_length,
            tasks_in_flight,
        })
    }

    pub fn observe_execution(&self, task_type: &str, outcome: &str, duration_secs: f64) {
        self.tasks_total.with_label_values(&[outcome, task_type]).inc();
        self.task_processing_duration
            .with_label_values(&[task_type])
            .observe(duration_secs);
    }

    pub fn update_queue(&self, stats: &StatsSnapshot) {
        self.queue_length.set(stats.queue_length);
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
