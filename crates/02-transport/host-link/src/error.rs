use thiserror::Error;

pub type LinkResult<T, E = LinkError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport thread already running")]
    AlreadyStarted,

    #[error("host link is shut down")]
    ShutDown,

    #[error("failed to spawn transport thread: {0}")]
    Spawn(#[from] std::io::Error),
}
