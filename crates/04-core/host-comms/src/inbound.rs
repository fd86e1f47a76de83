//! Host to nanoapp path, including deferral for nanoapps not loaded yet.

use std::sync::Arc;

use comms_abi::{
    AppId, Event, EventData, FromHostData, HostEndpoint, HostMessage, InboundError,
    InboundOutcome, MessageHandle, SystemCallbackType, EVENT_MESSAGE_FROM_HOST,
    SYSTEM_INSTANCE_ID,
};

use crate::manager::{HostCommsManager, PooledMessage};

/// Result of one delivery attempt.
enum Delivery {
    Posted,
    NotFound,
    /// The loop refused the event; its free hook already released the slot.
    Refused,
}

impl HostCommsManager {
    /// Copies `message` into the pool and routes it to nanoapp `app_id`.
    ///
    /// If the nanoapp is not loaded yet, delivery is retried on the system
    /// loop after every load request already queued there.
    pub fn send_message_to_nanoapp_from_host(
        &self,
        app_id: AppId,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message: &[u8],
    ) -> InboundOutcome {
        let outcome = self.route_from_host(app_id, message_type, host_endpoint, message);
        self.metrics.record_inbound(outcome);
        outcome
    }

    fn route_from_host(
        &self,
        app_id: AppId,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message: &[u8],
    ) -> InboundOutcome {
        if host_endpoint.is_broadcast() {
            tracing::error!(app_id, "received message from host at broadcast endpoint");
            return InboundOutcome::Rejected(InboundError::BroadcastSource);
        }
        if u32::try_from(message.len()).is_err() {
            tracing::error!(app_id, size = message.len(), "message from host too large");
            return InboundOutcome::Rejected(InboundError::MessageTooLarge {
                size: message.len(),
            });
        }

        let Some((handle, crafted)) =
            self.craft_message_from_host(app_id, message_type, host_endpoint, message)
        else {
            tracing::error!(app_id, "message pool exhausted; message from host dropped");
            return InboundOutcome::Rejected(InboundError::PoolExhausted);
        };

        match self.deliver_message_from_host(handle, crafted) {
            Delivery::Posted => InboundOutcome::Delivered,
            Delivery::Refused => InboundOutcome::Rejected(InboundError::EventLoopUnavailable),
            Delivery::NotFound => self.defer_message_from_host(handle, app_id),
        }
    }

    /// Retries delivery of a deferred message. Drops it if the destination is
    /// still unknown.
    pub fn send_deferred_message_to_nanoapp_from_host(&self, handle: MessageHandle) -> bool {
        let Some(message) = self
            .pool
            .with_live(handle, |pooled| Arc::clone(&pooled.message))
        else {
            tracing::warn!(slot = handle.slot, "deferred message no longer in pool");
            return false;
        };
        let app_id = message.app_id;

        match self.deliver_message_from_host(handle, message) {
            Delivery::Posted => {
                self.metrics.record_deferred_delivered();
                tracing::debug!(app_id, slot = handle.slot, "deferred message delivered");
                true
            }
            Delivery::Refused => false,
            Delivery::NotFound => {
                tracing::error!(
                    app_id,
                    slot = handle.slot,
                    "dropping message from host: destination nanoapp not found"
                );
                self.metrics.record_unknown_destination();
                self.free_message_from_host(handle);
                false
            }
        }
    }

    fn craft_message_from_host(
        &self,
        app_id: AppId,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message: &[u8],
    ) -> Option<(MessageHandle, Arc<HostMessage>)> {
        let data = FromHostData {
            message_type,
            host_endpoint,
        };
        let crafted = HostMessage::from_host(app_id, data, message.to_vec());
        let pooled = PooledMessage::new(crafted, None);
        let crafted = Arc::clone(&pooled.message);
        let handle = self.pool.allocate(pooled).ok()?;
        Some((handle, crafted))
    }

    fn deliver_message_from_host(
        &self,
        handle: MessageHandle,
        message: Arc<HostMessage>,
    ) -> Delivery {
        let app_id = message.app_id;
        let target = self.event_loops.iter().find_map(|event_loop| {
            event_loop
                .find_nanoapp_instance_id(app_id)
                .map(|instance_id| (event_loop, instance_id))
        });
        let Some((event_loop, instance_id)) = target else {
            return Delivery::NotFound;
        };

        let this = self.this.clone();
        let event = Event::new(
            EVENT_MESSAGE_FROM_HOST,
            SYSTEM_INSTANCE_ID,
            instance_id,
            EventData::MessageFromHost(message),
        )
        .with_free(Box::new(move || {
            if let Some(manager) = this.upgrade() {
                manager.free_message_from_host(handle);
            }
        }));

        match event_loop.post_event(event) {
            Ok(()) => {
                tracing::trace!(app_id, instance_id, slot = handle.slot, "message from host posted");
                Delivery::Posted
            }
            Err(event) => {
                tracing::error!(app_id, instance_id, "event loop refused message from host");
                drop(event);
                Delivery::Refused
            }
        }
    }

    fn defer_message_from_host(&self, handle: MessageHandle, app_id: AppId) -> InboundOutcome {
        let this = self.this.clone();
        let deferred = self.system_loop().defer_callback(
            SystemCallbackType::DeferredMessageToNanoappFromHost,
            Box::new(move || {
                if let Some(manager) = this.upgrade() {
                    manager.send_deferred_message_to_nanoapp_from_host(handle);
                }
            }),
        );
        if deferred {
            tracing::debug!(app_id, slot = handle.slot, "destination not loaded; delivery deferred");
            InboundOutcome::Deferred
        } else {
            tracing::error!(app_id, "system loop refused deferred delivery");
            self.free_message_from_host(handle);
            InboundOutcome::Rejected(InboundError::EventLoopUnavailable)
        }
    }

    /// Returns an inbound message's slot to the pool.
    pub(crate) fn free_message_from_host(&self, handle: MessageHandle) {
        match self.pool.release(handle) {
            Ok(released) => drop(released),
            Err(err) => tracing::warn!(%err, "message from host released twice"),
        }
    }
}
