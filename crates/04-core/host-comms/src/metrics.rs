use std::sync::atomic::{AtomicU32, Ordering};

use comms_abi::InboundOutcome;

use crate::error::SendError;

#[derive(Default)]
pub(crate) struct CommsMetrics {
    outbound_accepted: AtomicU32,
    rejected_too_large: AtomicU32,
    rejected_permissions: AtomicU32,
    rejected_pool_exhausted: AtomicU32,
    rejected_by_transport: AtomicU32,
    completions: AtomicU32,
    duplicate_completions: AtomicU32,
    free_callbacks_invoked: AtomicU32,
    free_callbacks_abandoned: AtomicU32,
    inbound_delivered: AtomicU32,
    inbound_deferred: AtomicU32,
    inbound_rejected: AtomicU32,
    deferred_delivered: AtomicU32,
    unknown_destination_drops: AtomicU32,
}

impl CommsMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.outbound_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_rejection(&self, error: &SendError) {
        let counter = match error {
            SendError::MessageTooLarge { .. } => &self.rejected_too_large,
            SendError::PermissionViolation { .. } => &self.rejected_permissions,
            SendError::PoolExhausted => &self.rejected_pool_exhausted,
            SendError::TransportRejected => &self.rejected_by_transport,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate_completion(&self) {
        self.duplicate_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_free_callback(&self) {
        self.free_callbacks_invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_free_callback_abandoned(&self) {
        self.free_callbacks_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inbound(&self, outcome: InboundOutcome) {
        let counter = match outcome {
            InboundOutcome::Delivered => &self.inbound_delivered,
            InboundOutcome::Deferred => &self.inbound_deferred,
            InboundOutcome::Rejected(_) => &self.inbound_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred_delivered(&self) {
        self.deferred_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_destination(&self) {
        self.unknown_destination_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CommsMetricsSnapshot {
        CommsMetricsSnapshot {
            outbound_accepted: self.outbound_accepted.load(Ordering::Relaxed),
            rejected_too_large: self.rejected_too_large.load(Ordering::Relaxed),
            rejected_permissions: self.rejected_permissions.load(Ordering::Relaxed),
            rejected_pool_exhausted: self.rejected_pool_exhausted.load(Ordering::Relaxed),
            rejected_by_transport: self.rejected_by_transport.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            duplicate_completions: self.duplicate_completions.load(Ordering::Relaxed),
            free_callbacks_invoked: self.free_callbacks_invoked.load(Ordering::Relaxed),
            free_callbacks_abandoned: self.free_callbacks_abandoned.load(Ordering::Relaxed),
            inbound_delivered: self.inbound_delivered.load(Ordering::Relaxed),
            inbound_deferred: self.inbound_deferred.load(Ordering::Relaxed),
            inbound_rejected: self.inbound_rejected.load(Ordering::Relaxed),
            deferred_delivered: self.deferred_delivered.load(Ordering::Relaxed),
            unknown_destination_drops: self.unknown_destination_drops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the core's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommsMetricsSnapshot {
    pub outbound_accepted: u32,
    pub rejected_too_large: u32,
    pub rejected_permissions: u32,
    pub rejected_pool_exhausted: u32,
    pub rejected_by_transport: u32,
    /// First completion reported for an in-flight message.
    pub completions: u32,
    /// Completions ignored because the message was no longer in flight.
    pub duplicate_completions: u32,
    pub free_callbacks_invoked: u32,
    /// Free callbacks dropped because the owning event loop refused the hand-off.
    pub free_callbacks_abandoned: u32,
    pub inbound_delivered: u32,
    pub inbound_deferred: u32,
    pub inbound_rejected: u32,
    pub deferred_delivered: u32,
    /// Deferred messages dropped because the destination never loaded.
    pub unknown_destination_drops: u32,
}

impl CommsMetricsSnapshot {
    /// Sum of all outbound rejection counters.
    pub fn outbound_rejected(&self) -> u32 {
        self.rejected_too_large
            + self.rejected_permissions
            + self.rejected_pool_exhausted
            + self.rejected_by_transport
    }
}
