use comms_abi::MESSAGE_TO_HOST_MAX_SIZE;
use serde::{Deserialize, Serialize};

/// Default number of messages that may be in flight at once, across both directions.
pub const DEFAULT_MAX_OUTSTANDING_MESSAGES: usize = 32;

/// Sizing knobs for [`crate::HostCommsManager`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCommsConfig {
    /// Capacity of the message pool.
    pub max_outstanding_messages: usize,
    /// Largest payload accepted from a nanoapp, in bytes.
    pub max_message_to_host_size: usize,
}

impl Default for HostCommsConfig {
    fn default() -> Self {
        Self {
            max_outstanding_messages: DEFAULT_MAX_OUTSTANDING_MESSAGES,
            max_message_to_host_size: MESSAGE_TO_HOST_MAX_SIZE,
        }
    }
}
