use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Events queued before further posts are refused. System callbacks and
    /// load requests do not count against it.
    pub event_queue_capacity: usize,
    /// Thread name used by [`crate::EventLoop::spawn`].
    pub name: String,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            name: "event-loop".to_string(),
        }
    }
}
