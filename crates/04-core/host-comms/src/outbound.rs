//! Nanoapp to host path.

use comms_abi::{
    HostEndpoint, HostMessage, MessageFreeFn, MessageHandle, NanoappInfo, OutboundMessage,
    Permissions, ToHostData,
};
use std::sync::Arc;

use crate::error::{SendError, SendRejected};
use crate::manager::{into_payload, HostCommsManager, PooledMessage};

impl HostCommsManager {
    /// Queues a message from `nanoapp` to the host.
    ///
    /// Returns true if the host link accepted the message. In that case the
    /// free callback, if any, runs exactly once on the nanoapp's event loop
    /// after the link reports completion. On false it is dropped uninvoked.
    pub fn send_message_to_host_from_nanoapp(
        &self,
        nanoapp: &NanoappInfo,
        message: Vec<u8>,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message_permissions: Permissions,
        free_callback: Option<MessageFreeFn>,
    ) -> bool {
        self.try_send_message_to_host_from_nanoapp(
            nanoapp,
            message,
            message_type,
            host_endpoint,
            message_permissions,
            free_callback,
        )
        .is_ok()
    }

    /// Like [`HostCommsManager::send_message_to_host_from_nanoapp`], but
    /// reports why a message was refused and hands the payload back.
    pub fn try_send_message_to_host_from_nanoapp(
        &self,
        nanoapp: &NanoappInfo,
        message: Vec<u8>,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message_permissions: Permissions,
        free_callback: Option<MessageFreeFn>,
    ) -> Result<MessageHandle, SendRejected> {
        let app_id = nanoapp.app_id();
        let app_permissions = nanoapp.app_permissions();

        let max = self.config.max_message_to_host_size;
        if message.len() > max {
            tracing::error!(
                app_id,
                size = message.len(),
                max,
                "message to host too large"
            );
            return Err(self.reject(
                SendError::MessageTooLarge {
                    size: message.len(),
                    max,
                },
                message,
            ));
        }

        if !app_permissions.contains(message_permissions) {
            tracing::error!(
                app_id,
                %app_permissions,
                %message_permissions,
                "message permissions not a subset of app permissions"
            );
            return Err(self.reject(
                SendError::PermissionViolation {
                    message: message_permissions,
                    app: app_permissions,
                },
                message,
            ));
        }

        let woke_host = !self.power.host_is_awake();
        let data = ToHostData {
            message_type,
            app_permissions,
            message_permissions,
            host_endpoint,
            woke_host,
        };
        let message = HostMessage::to_host(app_id, data, message);
        let pooled = PooledMessage::new(message, free_callback);
        let shared = Arc::clone(&pooled.message);
        let handle = match self.pool.allocate(pooled) {
            Ok(handle) => handle,
            Err(pooled) => {
                drop(shared);
                tracing::error!(app_id, "message pool exhausted; message to host dropped");
                return Err(self.reject(SendError::PoolExhausted, into_payload(pooled.message)));
            }
        };

        let outbound = OutboundMessage {
            handle,
            message: shared,
        };
        if !self.host_link.send_message(outbound) {
            tracing::warn!(app_id, slot = handle.slot, "host link refused message");
            let payload = match self.pool.release(handle) {
                Ok(Some(pooled)) => into_payload(pooled.message),
                // The link broke its contract and completed a refused message.
                Ok(None) | Err(_) => Vec::new(),
            };
            return Err(self.reject(SendError::TransportRejected, payload));
        }

        nanoapp.blame_host_message_sent();
        if woke_host && self.blame.try_claim() {
            nanoapp.blame_host_wakeup();
            tracing::debug!(app_id, "nanoapp blamed for host wakeup");
        }
        self.metrics.record_accepted();
        tracing::trace!(
            app_id,
            message_type,
            %host_endpoint,
            slot = handle.slot,
            woke_host,
            "message to host queued"
        );
        Ok(handle)
    }

    fn reject(&self, error: SendError, message: Vec<u8>) -> SendRejected {
        self.metrics.record_send_rejection(&error);
        SendRejected { error, message }
    }
}
