use comms_abi::AppId;
use thiserror::Error;

pub type LoopResult<T, E = LoopError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("event loop stopped")]
    Stopped,

    #[error("event loop event queue full")]
    QueueFull,

    #[error("nanoapp {0:#x} already loaded")]
    AlreadyLoaded(AppId),

    #[error("nanoapp {0:#x} failed to start")]
    StartFailed(AppId),

    #[error("failed to spawn event loop thread: {0}")]
    Spawn(#[from] std::io::Error),
}
