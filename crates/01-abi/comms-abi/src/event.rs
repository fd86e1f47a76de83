//! Events posted to nanoapps.

use std::fmt;
use std::sync::Arc;

use crate::{HostMessage, InstanceId};

/// Hook run once the event has been handled (or discarded).
pub type EventFreeFn = Box<dyn FnOnce() + Send + 'static>;

/// Payload carried by an [`Event`].
#[derive(Clone, Debug)]
pub enum EventData {
    /// No payload.
    Empty,
    /// Message received from the host.
    MessageFromHost(Arc<HostMessage>),
    /// Opaque value for nanoapp-to-nanoapp events.
    Value(u64),
}

/// Unit of work delivered to a single nanoapp instance.
///
/// The free hook runs exactly once: when the event is dropped after delivery,
/// or when it is dropped without ever being delivered, such as after a
/// refused post.
pub struct Event {
    pub event_type: u16,
    pub sender_instance_id: InstanceId,
    pub target_instance_id: InstanceId,
    pub data: EventData,
    free: Option<EventFreeFn>,
}

impl Event {
    pub fn new(
        event_type: u16,
        sender_instance_id: InstanceId,
        target_instance_id: InstanceId,
        data: EventData,
    ) -> Self {
        Self {
            event_type,
            sender_instance_id,
            target_instance_id,
            data,
            free: None,
        }
    }

    /// Attaches a hook released after the event is consumed.
    pub fn with_free(mut self, free: EventFreeFn) -> Self {
        self.free = Some(free);
        self
    }

    /// Message carried by a message-from-host event.
    pub fn message_from_host(&self) -> Option<&Arc<HostMessage>> {
        match &self.data {
            EventData::MessageFromHost(message) => Some(message),
            _ => None,
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Some(free) = self.free.take() {
            free();
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("sender_instance_id", &self.sender_instance_id)
            .field("target_instance_id", &self.target_instance_id)
            .field("data", &self.data)
            .field("has_free", &self.free.is_some())
            .finish()
    }
}
