//! Release of messages the host link is done with.

use comms_abi::{MessageFreeFn, MessageHandle, SystemCallbackType};

use crate::manager::{into_payload, HostCommsManager};

impl HostCommsManager {
    /// Called by the host link once per accepted message, from any thread.
    ///
    /// Messages without a free callback are released on the spot. Otherwise
    /// the callback runs on the sending nanoapp's event loop, and the slot is
    /// released right after it. Completions for messages no longer in flight
    /// are ignored.
    pub fn on_message_to_host_complete(&self, handle: MessageHandle) {
        let Some(pooled) = self.pool.retire(handle) else {
            self.metrics.record_duplicate_completion();
            tracing::warn!(
                slot = handle.slot,
                generation = handle.generation,
                "ignoring completion for message not in flight"
            );
            return;
        };
        self.metrics.record_completion();

        let app_id = pooled.message.app_id;
        let Some(free_callback) = pooled.free_callback else {
            drop(pooled.message);
            self.release_message_to_host(handle);
            tracing::trace!(app_id, slot = handle.slot, "message to host released");
            return;
        };

        let payload = into_payload(pooled.message);
        let owner = self.loop_for(app_id).unwrap_or_else(|| self.system_loop());
        let this = self.this.clone();
        let deferred = owner.defer_callback(
            SystemCallbackType::MessageToHostComplete,
            Box::new(move || match this.upgrade() {
                Some(manager) => manager.free_message_to_host(handle, free_callback, payload),
                None => free_callback(payload),
            }),
        );

        if !deferred {
            self.metrics.record_free_callback_abandoned();
            tracing::error!(
                app_id,
                slot = handle.slot,
                "stopped event loop refused free callback; releasing without it"
            );
            self.release_message_to_host(handle);
        }
    }

    /// Runs on the owning event loop: hands the payload back, then frees the slot.
    fn free_message_to_host(
        &self,
        handle: MessageHandle,
        free_callback: MessageFreeFn,
        payload: Vec<u8>,
    ) {
        debug_assert!(
            self.on_any_loop_thread(),
            "free callback must run on an event loop thread"
        );
        free_callback(payload);
        self.metrics.record_free_callback();
        self.release_message_to_host(handle);
    }

    fn release_message_to_host(&self, handle: MessageHandle) {
        if let Err(err) = self.pool.release(handle) {
            tracing::warn!(%err, "message to host already released");
        }
    }
}
