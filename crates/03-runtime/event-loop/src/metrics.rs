use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub(crate) struct LoopMetrics {
    events_delivered: AtomicU32,
    events_dropped: AtomicU32,
    system_callbacks_run: AtomicU32,
}

impl LoopMetrics {
    pub(crate) fn record_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_system_callback(&self) {
        self.system_callbacks_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            system_callbacks_run: self.system_callbacks_run.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopMetricsSnapshot {
    pub events_delivered: u32,
    /// Events whose target instance was not loaded when processed.
    pub events_dropped: u32,
    pub system_callbacks_run: u32,
}
