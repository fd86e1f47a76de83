use std::sync::atomic::{AtomicU32, Ordering};

use crate::{AppId, InstanceId, Permissions};

/// Identity and power-accounting counters for one loaded nanoapp.
///
/// Shared between the event loop that hosts the nanoapp and the host comms
/// core, which reads the declared permissions and updates the blame counters.
#[derive(Debug)]
pub struct NanoappInfo {
    app_id: AppId,
    instance_id: InstanceId,
    app_permissions: Permissions,
    wakeup_blames: AtomicU32,
    messages_sent: AtomicU32,
}

impl NanoappInfo {
    pub fn new(app_id: AppId, instance_id: InstanceId, app_permissions: Permissions) -> Self {
        Self {
            app_id,
            instance_id,
            app_permissions,
            wakeup_blames: AtomicU32::new(0),
            messages_sent: AtomicU32::new(0),
        }
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn app_permissions(&self) -> Permissions {
        self.app_permissions
    }

    /// Records that a message from this nanoapp woke the host.
    pub fn blame_host_wakeup(&self) {
        self.wakeup_blames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that this nanoapp handed a message to the host link.
    pub fn blame_host_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn wakeup_blame_count(&self) -> u32 {
        self.wakeup_blames.load(Ordering::Relaxed)
    }

    pub fn messages_sent_count(&self) -> u32 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}
