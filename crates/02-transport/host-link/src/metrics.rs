use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub(crate) struct LinkMetrics {
    accepted: AtomicU32,
    rejected: AtomicU32,
    transmitted: AtomicU32,
    failed: AtomicU32,
}

impl LinkMetrics {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transmitted(&self) {
        self.transmitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkMetricsSnapshot {
    pub accepted: u32,
    pub rejected: u32,
    pub transmitted: u32,
    /// Accepted messages that never reached the host. Still completed.
    pub failed: u32,
}

impl LinkMetricsSnapshot {
    /// Accepted messages whose completion has been reported.
    pub fn completed(&self) -> u32 {
        self.transmitted + self.failed
    }
}
