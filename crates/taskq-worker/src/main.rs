use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use taskq_core::{Priority, PriorityQueue, Task};
use taskq_worker::{DelayHandler, EchoHandler, TaskQueueConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "In-process priority task queue worker pool", long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Number of worker loops
    #[arg(short, long)]
    workers: Option<usize>,

    /// Dequeue poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Number of demo tasks to enqueue
    #[arg(short, long, default_value = "50")]
    tasks: usize,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => TaskQueueConfig::from_file(path)?,
        None => TaskQueueConfig::default(),
    };

    // Override with CLI args
    if let Some(workers) = args.workers {
        config.pool.workers = workers;
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
        config.pool.poll_interval_ms = poll_interval_ms;
    }

    tracing::info!("Starting with config: {:?}", config);

    let queue = Arc::new(PriorityQueue::with_config(config.queue.clone()));
    let mut pool = WorkerPool::with_config(queue.clone(), config.pool.clone());
    pool.register_handler("echo", EchoHandler);
    pool.register_handler("delay", DelayHandler::default());
    tracing::info!("Registered task types: {:?}", pool.registry().task_types());

    let tiers = [Priority::low(), Priority::normal(), Priority::high()];
    for i in 0..args.tasks {
        let (task_type, payload) = if i % 2 == 0 {
            ("echo", format!("demo-{}", i))
        } else {
            ("delay", format!("{}", 10 + (i % 5) * 10))
        };
        let task = Task::builder(task_type, payload.into_bytes())
            .priority(tiers[i % tiers.len()])
            .build()?;
        queue.enqueue(task)?;
    }

    let cancel = CancellationToken::new();
    pool.start(cancel.clone())?;

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                if queue.is_empty() {
                    tracing::info!("All tasks resolved");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    pool.stop().await?;

    let stats = queue.stats();
    tracing::info!("Final stats: {}", serde_json::to_string(&stats)?);
    tracing::debug!("Metrics:\n{}", pool.metrics().encode_text()?);

    Ok(())
}
