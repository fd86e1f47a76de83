use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use comms_abi::{HostCommsIngress, PowerControl};

/// Tracks whether the host is awake and opens a new blame cycle on every suspend.
pub struct PowerControlManager {
    awake: AtomicBool,
    ingress: ArcSwapOption<Weak<dyn HostCommsIngress>>,
}

impl PowerControlManager {
    pub fn new(host_awake: bool) -> Self {
        Self {
            awake: AtomicBool::new(host_awake),
            ingress: ArcSwapOption::empty(),
        }
    }

    pub fn on_host_wakeup(&self) {
        if !self.awake.swap(true, Ordering::AcqRel) {
            tracing::trace!("host awake");
        }
    }

    /// Marks the host suspended. Resets wakeup blame on the awake to suspend edge.
    pub fn on_host_suspend(&self) {
        if !self.awake.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::trace!("host suspended");
        match self.ingress.load_full().and_then(|ingress| ingress.upgrade()) {
            Some(ingress) => ingress.reset_blame_for_nanoapp_host_wakeup(),
            None => tracing::debug!("host suspended with no host comms bound"),
        }
    }
}

impl Default for PowerControlManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PowerControl for PowerControlManager {
    fn host_is_awake(&self) -> bool {
        self.awake.load(Ordering::Acquire)
    }

    fn bind(&self, ingress: Weak<dyn HostCommsIngress>) {
        self.ingress.store(Some(Arc::new(ingress)));
    }
}
