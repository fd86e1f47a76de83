//! Error surface of the host comms core.
//!
//! Every rejection is synchronous and reported to the caller; transport
//! failures never appear here because they surface only through completion.

use comms_abi::Permissions;
use thiserror::Error;

pub type PoolResult<T, E = PoolError> = Result<T, E>;

/// Errors raised by [`crate::MessagePool`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool capacity {requested} must be between 1 and {maximum}")]
    InvalidCapacity { requested: usize, maximum: usize },

    #[error("slot {slot} generation {generation} is not allocated")]
    StaleHandle { slot: u32, generation: u32 },
}

/// Why a message to the host was not accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("message permissions {message} are not a subset of app permissions {app}")]
    PermissionViolation {
        message: Permissions,
        app: Permissions,
    },

    #[error("message pool exhausted")]
    PoolExhausted,

    #[error("host link refused the message")]
    TransportRejected,
}

/// A refused message to the host, returning the payload to the caller.
///
/// The free callback supplied with the message is dropped without being invoked.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SendRejected {
    pub error: SendError,
    pub message: Vec<u8>,
}
