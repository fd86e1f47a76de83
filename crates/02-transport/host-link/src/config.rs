use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostLinkConfig {
    /// Messages queued towards the host before sends are refused.
    pub outbound_queue_capacity: usize,
    /// Upper bound for [`comms_abi::HostLink::flush_outbound_queue`].
    pub flush_timeout_ms: u64,
    /// Reports every completion twice. Exercises the core's duplicate handling.
    pub duplicate_completions: bool,
}

impl HostLinkConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl Default for HostLinkConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
            duplicate_completions: false,
        }
    }
}
