//! Contracts between the host comms core and the collaborators around it.

use std::sync::Weak;

use thiserror::Error;

use crate::{AppId, Event, HostEndpoint, InstanceId, MessageHandle, OutboundMessage};

/// Callback a nanoapp supplies to get its payload back once the host link is done with it.
pub type MessageFreeFn = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;

/// Work deferred onto an event loop thread.
pub type SystemCallback = Box<dyn FnOnce() + Send + 'static>;

/// Reason a system callback was deferred, for logging and accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystemCallbackType {
    /// Release a message to the host and invoke its free callback.
    MessageToHostComplete,
    /// Retry delivery of a message whose destination was not loaded yet.
    DeferredMessageToNanoappFromHost,
}

/// Why an inbound message was refused before delivery was attempted.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InboundError {
    #[error("host sent a message from the broadcast endpoint")]
    BroadcastSource,

    #[error("message of {size} bytes exceeds the inbound size limit")]
    MessageTooLarge { size: usize },

    #[error("message pool exhausted")]
    PoolExhausted,

    #[error("no event loop accepted the message")]
    EventLoopUnavailable,
}

/// Immediate result of handing a message from the host to the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Posted to the destination nanoapp's event loop.
    Delivered,
    /// Destination not loaded yet; delivery retried after pending loads.
    Deferred,
    /// Refused and freed.
    Rejected(InboundError),
}

/// Entry points the core exposes to the outside world. Callable from any thread.
pub trait HostCommsIngress: Send + Sync {
    /// Reports that the host link is done with a message previously passed to
    /// [`HostLink::send_message`], whether it was transmitted or not.
    fn on_message_to_host_complete(&self, handle: MessageHandle);

    /// Copies `message` and routes it to nanoapp `app_id`.
    fn send_message_to_nanoapp_from_host(
        &self,
        app_id: AppId,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message: &[u8],
    ) -> InboundOutcome;

    /// Clears the wakeup blame flag. Called on every host suspend.
    fn reset_blame_for_nanoapp_host_wakeup(&self);
}

/// Platform transport towards the host.
pub trait HostLink: Send + Sync {
    /// Registers the core that receives completions and inbound messages.
    fn bind(&self, ingress: Weak<dyn HostCommsIngress>);

    /// Queues a message for transmission without blocking.
    ///
    /// Returns false if the message was not accepted; no completion is
    /// reported in that case. Once accepted, completion is reported exactly once.
    fn send_message(&self, message: OutboundMessage) -> bool;

    /// Blocks until the host has retrieved every queued message or a timeout expires.
    fn flush_outbound_queue(&self) -> bool;

    /// Flushes on a best-effort basis and tells the host the hub is exiting.
    fn shutdown(&self);
}

/// View of an event loop hosting nanoapps.
pub trait EventLoopPort: Send + Sync {
    /// Looks up a loaded nanoapp by app id.
    fn find_nanoapp_instance_id(&self, app_id: AppId) -> Option<InstanceId>;

    /// Queues an event for the target instance, handing it back on failure.
    fn post_event(&self, event: Event) -> Result<(), Event>;

    /// Runs `callback` on the loop thread after every task already queued.
    ///
    /// Never refused for capacity: returns false only once the loop has stopped.
    fn defer_callback(&self, kind: SystemCallbackType, callback: SystemCallback) -> bool;

    /// True when called from the thread currently driving this loop.
    fn is_loop_thread(&self) -> bool;
}

/// Host power state as seen by the hub.
pub trait PowerControl: Send + Sync {
    fn host_is_awake(&self) -> bool;

    /// Registers the core whose blame flag is reset on suspend.
    fn bind(&self, _ingress: Weak<dyn HostCommsIngress>) {}
}
