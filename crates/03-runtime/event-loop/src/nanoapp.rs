use std::sync::Arc;

use comms_abi::{AppId, Event, InstanceId, NanoappInfo};

use crate::event_loop::EventLoopHandle;

/// Application code hosted by an [`crate::EventLoop`].
///
/// All callbacks run on the loop thread.
pub trait Nanoapp: Send + 'static {
    /// Called once while the load request is processed. Returning false aborts the load.
    fn start(&mut self, _ctx: &NanoappContext) -> bool {
        true
    }

    fn handle_event(&mut self, ctx: &NanoappContext, event: &Event);

    /// Called once when the nanoapp is unloaded or the loop stops.
    fn end(&mut self, _ctx: &NanoappContext) {}
}

/// What a nanoapp knows about itself and the loop it runs on.
#[derive(Clone)]
pub struct NanoappContext {
    info: Arc<NanoappInfo>,
    event_loop: EventLoopHandle,
}

impl NanoappContext {
    pub(crate) fn new(info: Arc<NanoappInfo>, event_loop: EventLoopHandle) -> Self {
        Self { info, event_loop }
    }

    pub fn info(&self) -> &Arc<NanoappInfo> {
        &self.info
    }

    pub fn app_id(&self) -> AppId {
        self.info.app_id()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.info.instance_id()
    }

    pub fn event_loop(&self) -> &EventLoopHandle {
        &self.event_loop
    }
}
