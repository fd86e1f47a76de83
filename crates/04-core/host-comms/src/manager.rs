use std::sync::{Arc, Weak};

use anyhow::{anyhow, bail, Context, Result};
use comms_abi::{
    AppId, EventLoopPort, HostCommsIngress, HostEndpoint, HostLink, HostMessage, InboundOutcome,
    MessageFreeFn, MessageHandle, PowerControl,
};
use smallvec::SmallVec;

use crate::blame::WakeupBlame;
use crate::config::HostCommsConfig;
use crate::message_pool::MessagePool;
use crate::metrics::{CommsMetrics, CommsMetricsSnapshot};

/// Event loops registered with one manager. Most hubs run one or two.
pub(crate) type EventLoops = SmallVec<[Arc<dyn EventLoopPort>; 2]>;

/// Contents of one pool slot.
///
/// The free callback stays beside the shared message so the host link never
/// sees it.
pub(crate) struct PooledMessage {
    pub(crate) message: Arc<HostMessage>,
    pub(crate) free_callback: Option<MessageFreeFn>,
}

impl PooledMessage {
    pub(crate) fn new(message: HostMessage, free_callback: Option<MessageFreeFn>) -> Self {
        Self {
            message: Arc::new(message),
            free_callback,
        }
    }
}

/// Recovers the payload buffer once every other reference is gone.
///
/// Falls back to a copy if a collaborator still holds the message.
pub(crate) fn into_payload(message: Arc<HostMessage>) -> Vec<u8> {
    match Arc::try_unwrap(message) {
        Ok(message) => message.message,
        Err(shared) => {
            tracing::warn!(
                app_id = shared.app_id,
                "message still shared at release; copying payload"
            );
            shared.message.clone()
        }
    }
}

/// Bidirectional message exchange between nanoapps and the host.
///
/// Owns the message pool and the wakeup blame flag. Collaborators are
/// injected through [`HostCommsManager::builder`].
pub struct HostCommsManager {
    pub(crate) config: HostCommsConfig,
    pub(crate) host_link: Arc<dyn HostLink>,
    pub(crate) event_loops: EventLoops,
    pub(crate) power: Arc<dyn PowerControl>,
    pub(crate) pool: MessagePool<PooledMessage>,
    pub(crate) blame: WakeupBlame,
    pub(crate) metrics: CommsMetrics,
    pub(crate) this: Weak<HostCommsManager>,
}

impl HostCommsManager {
    pub fn builder() -> HostCommsManagerBuilder {
        HostCommsManagerBuilder::default()
    }

    pub fn config(&self) -> &HostCommsConfig {
        &self.config
    }

    /// Clears the wakeup blame flag, opening a new wake cycle.
    pub fn reset_blame_for_nanoapp_host_wakeup(&self) {
        self.blame.reset();
        tracing::debug!("host wakeup blame reset");
    }

    /// True once a nanoapp has been blamed in the current wake cycle.
    pub fn is_nanoapp_blamed_for_wakeup(&self) -> bool {
        self.blame.is_blamed()
    }

    /// Blocks until the host link drained its queue or timed out.
    pub fn flush_outbound_queue(&self) -> bool {
        self.host_link.flush_outbound_queue()
    }

    /// Flushes and tells the host the hub is going away.
    pub fn shutdown(&self) {
        tracing::debug!(
            outstanding = self.pool.outstanding(),
            "host comms shutting down"
        );
        self.host_link.shutdown();
    }

    /// Messages currently holding a pool slot, in either direction.
    pub fn outstanding_messages(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn metrics(&self) -> CommsMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Loop that hosts `app_id`, if any.
    pub(crate) fn loop_for(&self, app_id: AppId) -> Option<&Arc<dyn EventLoopPort>> {
        self.event_loops
            .iter()
            .find(|event_loop| event_loop.find_nanoapp_instance_id(app_id).is_some())
    }

    /// First registered loop. The builder refuses an empty loop list.
    pub(crate) fn system_loop(&self) -> &Arc<dyn EventLoopPort> {
        &self.event_loops[0]
    }

    pub(crate) fn on_any_loop_thread(&self) -> bool {
        self.event_loops.iter().any(|event_loop| event_loop.is_loop_thread())
    }
}

impl HostCommsIngress for HostCommsManager {
    fn on_message_to_host_complete(&self, handle: MessageHandle) {
        HostCommsManager::on_message_to_host_complete(self, handle);
    }

    fn send_message_to_nanoapp_from_host(
        &self,
        app_id: AppId,
        message_type: u32,
        host_endpoint: HostEndpoint,
        message: &[u8],
    ) -> InboundOutcome {
        HostCommsManager::send_message_to_nanoapp_from_host(
            self,
            app_id,
            message_type,
            host_endpoint,
            message,
        )
    }

    fn reset_blame_for_nanoapp_host_wakeup(&self) {
        HostCommsManager::reset_blame_for_nanoapp_host_wakeup(self);
    }
}

#[derive(Default)]
pub struct HostCommsManagerBuilder {
    config: Option<HostCommsConfig>,
    host_link: Option<Arc<dyn HostLink>>,
    event_loops: EventLoops,
    power: Option<Arc<dyn PowerControl>>,
}

impl HostCommsManagerBuilder {
    pub fn config(mut self, config: HostCommsConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn host_link(mut self, host_link: Arc<dyn HostLink>) -> Self {
        self.host_link = Some(host_link);
        self
    }

    /// Registers an event loop. The first one becomes the system loop.
    pub fn event_loop(mut self, event_loop: Arc<dyn EventLoopPort>) -> Self {
        self.event_loops.push(event_loop);
        self
    }

    pub fn power_control(mut self, power: Arc<dyn PowerControl>) -> Self {
        self.power = Some(power);
        self
    }

    /// Builds the manager and binds it to the host link and power control.
    pub fn build(self) -> Result<Arc<HostCommsManager>> {
        let host_link = self
            .host_link
            .ok_or_else(|| anyhow!("missing host link"))?;
        let power = self
            .power
            .ok_or_else(|| anyhow!("missing power control"))?;
        if self.event_loops.is_empty() {
            bail!("at least one event loop is required");
        }
        let config = self.config.unwrap_or_default();
        let pool = MessagePool::new(config.max_outstanding_messages)
            .context("failed to size message pool")?;

        let manager = Arc::new_cyclic(|this| HostCommsManager {
            config,
            host_link,
            event_loops: self.event_loops,
            power,
            pool,
            blame: WakeupBlame::new(),
            metrics: CommsMetrics::new(),
            this: this.clone(),
        });

        let weak = Arc::downgrade(&manager);
        let ingress: Weak<dyn HostCommsIngress> = weak;
        manager.host_link.bind(ingress.clone());
        manager.power.bind(ingress);
        tracing::debug!(
            pool_capacity = manager.pool.capacity(),
            event_loops = manager.event_loops.len(),
            "host comms manager ready"
        );
        Ok(manager)
    }
}
