//! Host wakeup attribution.
//!
//! At most one nanoapp is blamed per host wake cycle. The flag is claimed by
//! the first waking message and cleared by power control when the host
//! suspends again.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct WakeupBlame {
    blamed: AtomicBool,
}

impl WakeupBlame {
    pub const fn new() -> Self {
        Self {
            blamed: AtomicBool::new(false),
        }
    }

    /// Claims the blame for the current wake cycle. Only the first caller wins.
    pub fn try_claim(&self) -> bool {
        self.blamed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Opens a new wake cycle.
    pub fn reset(&self) {
        self.blamed.store(false, Ordering::Release);
    }

    pub fn is_blamed(&self) -> bool {
        self.blamed.load(Ordering::Acquire)
    }
}
