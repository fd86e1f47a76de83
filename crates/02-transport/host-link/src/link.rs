//! Simulated host link.
//!
//! Outbound messages wait in a bounded queue until they are transmitted,
//! either by the transport thread started with [`SimulatedHostLink::start`]
//! or by explicit [`SimulatedHostLink::pump`] calls. Every accepted message
//! is completed exactly once through the bound [`HostCommsIngress`], after
//! the link has dropped its reference to it. That holds for failed
//! transmissions and for messages still queued at shutdown too.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use comms_abi::{
    AppId, HostCommsIngress, HostEndpoint, HostLink, InboundOutcome, MessageHandle,
    OutboundMessage,
};
use parking_lot::{Condvar, Mutex};

use crate::config::HostLinkConfig;
use crate::error::{LinkError, LinkResult};
use crate::metrics::{LinkMetrics, LinkMetricsSnapshot};

/// A message as the host received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostDelivery {
    pub handle: MessageHandle,
    pub app_id: AppId,
    pub message_type: u32,
    pub host_endpoint: HostEndpoint,
    pub woke_host: bool,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct LinkState {
    queue: VecDeque<OutboundMessage>,
    in_transit: usize,
    paused: bool,
    fail_next: u32,
    shut_down: bool,
    stopping: bool,
}

impl LinkState {
    fn drained(&self) -> bool {
        self.queue.is_empty() && self.in_transit == 0
    }

    fn take_next(&mut self) -> Option<(OutboundMessage, bool)> {
        if self.paused {
            return None;
        }
        let message = self.queue.pop_front()?;
        self.in_transit += 1;
        let fail = self.fail_next > 0;
        if fail {
            self.fail_next -= 1;
        }
        Some((message, fail))
    }
}

struct LinkShared {
    config: HostLinkConfig,
    state: Mutex<LinkState>,
    changed: Condvar,
    ingress: ArcSwapOption<Weak<dyn HostCommsIngress>>,
    received: Mutex<Vec<HostDelivery>>,
    exiting: AtomicBool,
    metrics: LinkMetrics,
}

impl LinkShared {
    fn ingress(&self) -> Option<Arc<dyn HostCommsIngress>> {
        self.ingress.load_full().and_then(|ingress| ingress.upgrade())
    }

    fn transmit(&self, message: OutboundMessage, fail: bool) {
        let handle = message.handle;
        let data = message.to_host_data().copied();
        match data {
            Some(data) if !fail => {
                self.received.lock().push(HostDelivery {
                    handle,
                    app_id: message.message.app_id,
                    message_type: data.message_type,
                    host_endpoint: data.host_endpoint,
                    woke_host: data.woke_host,
                    payload: message.payload().to_vec(),
                });
                self.metrics.record_transmitted();
            }
            Some(_) => {
                tracing::warn!(slot = handle.slot, "transmission to host failed");
                self.metrics.record_failed();
            }
            None => {
                tracing::error!(slot = handle.slot, "outbound message without to-host metadata");
                self.metrics.record_failed();
            }
        }
        drop(message);
        self.complete(handle);

        self.state.lock().in_transit -= 1;
        self.changed.notify_all();
    }

    fn complete(&self, handle: MessageHandle) {
        let Some(ingress) = self.ingress() else {
            tracing::warn!(slot = handle.slot, "completion dropped: no host comms bound");
            return;
        };
        ingress.on_message_to_host_complete(handle);
        if self.config.duplicate_completions {
            ingress.on_message_to_host_complete(handle);
        }
    }

    /// Completes everything still queued as failed.
    fn fail_queued(&self) {
        let leftover: Vec<_> = {
            let mut state = self.state.lock();
            let leftover: Vec<_> = state.queue.drain(..).collect();
            state.in_transit += leftover.len();
            leftover
        };
        if !leftover.is_empty() {
            tracing::warn!(count = leftover.len(), "failing messages still queued at shutdown");
        }
        for message in leftover {
            self.transmit(message, true);
        }
    }
}

fn run_transport(shared: Arc<LinkShared>) {
    tracing::debug!("host link transport started");
    loop {
        let (message, fail) = {
            let mut state = shared.state.lock();
            loop {
                if state.stopping {
                    tracing::debug!("host link transport stopped");
                    return;
                }
                if let Some(next) = state.take_next() {
                    break next;
                }
                shared.changed.wait(&mut state);
            }
        };
        shared.transmit(message, fail);
    }
}

pub struct SimulatedHostLink {
    shared: Arc<LinkShared>,
    transport: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedHostLink {
    pub fn new(config: HostLinkConfig) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                config,
                state: Mutex::new(LinkState::default()),
                changed: Condvar::new(),
                ingress: ArcSwapOption::empty(),
                received: Mutex::new(Vec::new()),
                exiting: AtomicBool::new(false),
                metrics: LinkMetrics::default(),
            }),
            transport: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HostLinkConfig {
        &self.shared.config
    }

    /// Starts the transport thread, which transmits queued messages as they arrive.
    pub fn start(&self) -> LinkResult<()> {
        let mut transport = self.transport.lock();
        if transport.is_some() {
            return Err(LinkError::AlreadyStarted);
        }
        if self.shared.state.lock().shut_down {
            return Err(LinkError::ShutDown);
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("host-link".into())
            .spawn(move || run_transport(shared))?;
        *transport = Some(handle);
        Ok(())
    }

    /// Transmits up to `max` queued messages on the calling thread.
    pub fn pump(&self, max: usize) -> usize {
        let mut transmitted = 0;
        while transmitted < max {
            let Some((message, fail)) = self.shared.state.lock().take_next() else {
                break;
            };
            self.shared.transmit(message, fail);
            transmitted += 1;
        }
        transmitted
    }

    /// Stops transmitting until [`SimulatedHostLink::resume`], as if the host stalled.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.changed.notify_all();
    }

    /// Makes the next `count` transmissions fail.
    pub fn fail_next(&self, count: u32) {
        self.shared.state.lock().fail_next += count;
    }

    /// Messages accepted but not yet picked up for transmission.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// True once the host has been told the hub is exiting.
    pub fn exiting_notice_sent(&self) -> bool {
        self.shared.exiting.load(Ordering::Acquire)
    }

    /// Drains the messages the host has received so far.
    pub fn take_received(&self) -> Vec<HostDelivery> {
        std::mem::take(&mut *self.shared.received.lock())
    }

    /// Hands a message from the host to the bound core.
    ///
    /// Returns `None` when no core is bound.
    pub fn deliver_from_host(
        &self,
        app_id: AppId,
        message_type: u32,
        host_endpoint: HostEndpoint,
        payload: &[u8],
    ) -> Option<InboundOutcome> {
        let ingress = self.shared.ingress()?;
        Some(ingress.send_message_to_nanoapp_from_host(
            app_id,
            message_type,
            host_endpoint,
            payload,
        ))
    }

    pub fn metrics(&self) -> LinkMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn stop_transport(&self) {
        self.shared.state.lock().stopping = true;
        self.shared.changed.notify_all();
        let Some(handle) = self.transport.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("host link transport thread panicked");
        }
    }
}

impl HostLink for SimulatedHostLink {
    fn bind(&self, ingress: Weak<dyn HostCommsIngress>) {
        self.shared.ingress.store(Some(Arc::new(ingress)));
    }

    fn send_message(&self, message: OutboundMessage) -> bool {
        let mut state = self.shared.state.lock();
        if state.shut_down {
            drop(state);
            self.shared.metrics.record_rejected();
            tracing::debug!(slot = message.handle.slot, "send after shutdown refused");
            return false;
        }
        if state.queue.len() >= self.shared.config.outbound_queue_capacity {
            drop(state);
            self.shared.metrics.record_rejected();
            tracing::warn!(slot = message.handle.slot, "outbound queue full");
            return false;
        }
        state.queue.push_back(message);
        drop(state);
        self.shared.metrics.record_accepted();
        self.shared.changed.notify_all();
        true
    }

    fn flush_outbound_queue(&self) -> bool {
        let deadline = Instant::now() + self.shared.config.flush_timeout();
        let mut state = self.shared.state.lock();
        while !state.drained() {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                if state.drained() {
                    break;
                }
                tracing::warn!(
                    queued = state.queue.len(),
                    in_transit = state.in_transit,
                    "outbound flush timed out"
                );
                return false;
            }
        }
        true
    }

    fn shutdown(&self) {
        if self.is_shut_down() {
            return;
        }
        let flushed = self.flush_outbound_queue();
        self.shared.exiting.store(true, Ordering::Release);
        self.shared.state.lock().shut_down = true;
        tracing::debug!(flushed, "host notified of hub exit");

        self.stop_transport();
        self.shared.fail_queued();
    }
}

impl Drop for SimulatedHostLink {
    fn drop(&mut self) {
        self.stop_transport();
    }
}
