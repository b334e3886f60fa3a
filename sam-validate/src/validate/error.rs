use thiserror::Error;

/// Failures that stop the whole batch. A validator that fails or cannot be
/// found is not one of these; it only produces a non-zero exit code.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Unable to start `{command}`, the system is out of resources. {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("A validation worker stopped unexpectedly. {0}")]
    WorkerPanicked(#[from] tokio::task::JoinError),
    #[error("The worker pool was closed before all commands ran. {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),
}
