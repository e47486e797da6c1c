use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool is already running")]
    AlreadyRunning,

    #[error("Worker {worker} terminated abnormally: {reason}")]
    WorkerTerminated { worker: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, PoolError>;
