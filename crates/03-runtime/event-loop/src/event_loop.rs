//! Single-threaded event loop hosting nanoapps.
//!
//! Every interaction with a loop (event posts, system callbacks, load and
//! unload requests) is a task on one FIFO queue, processed on whichever
//! thread drives the [`EventLoop`]. Only events count against the queue
//! capacity: system callbacks and load requests are refused only once the
//! loop has stopped. A nanoapp becomes visible to
//! [`EventLoopPort::find_nanoapp_instance_id`] only once its load task ran,
//! so a callback deferred after a load request always observes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use comms_abi::{
    AppId, Event, EventLoopPort, InstanceId, NanoappInfo, Permissions, SystemCallback,
    SystemCallbackType, SYSTEM_INSTANCE_ID,
};
use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::config::EventLoopConfig;
use crate::error::{LoopError, LoopResult};
use crate::metrics::{LoopMetrics, LoopMetricsSnapshot};
use crate::nanoapp::{Nanoapp, NanoappContext};

struct LoadRequest {
    info: Arc<NanoappInfo>,
    nanoapp: Box<dyn Nanoapp>,
}

enum Task {
    Deliver(Event),
    System {
        kind: SystemCallbackType,
        callback: SystemCallback,
    },
    Load(LoadRequest),
    Unload(AppId),
    Stop,
}

struct LoopShared {
    config: EventLoopConfig,
    registry: RwLock<HashMap<AppId, Arc<NanoappInfo>>>,
    next_instance_id: AtomicU16,
    owner: Mutex<Option<ThreadId>>,
    stop_requested: AtomicBool,
    /// Read-locked across every enqueue, write-locked once at shutdown.
    stopped: RwLock<bool>,
    queued_events: AtomicUsize,
    metrics: LoopMetrics,
}

/// Cloneable handle used to talk to an event loop from any thread.
#[derive(Clone)]
pub struct EventLoopHandle {
    tx: Sender<Task>,
    shared: Arc<LoopShared>,
}

impl EventLoopHandle {
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Queues a nanoapp load and returns the instance id it will run under.
    ///
    /// The nanoapp is discoverable once the loop has processed the request.
    pub fn request_load(
        &self,
        app_id: AppId,
        app_permissions: Permissions,
        nanoapp: Box<dyn Nanoapp>,
    ) -> LoopResult<InstanceId> {
        let instance_id = self.allocate_instance_id();
        let info = Arc::new(NanoappInfo::new(app_id, instance_id, app_permissions));
        self.enqueue(Task::Load(LoadRequest { info, nanoapp }))?;
        tracing::debug!(loop_name = self.name(), app_id, instance_id, "load requested");
        Ok(instance_id)
    }

    pub fn request_unload(&self, app_id: AppId) -> LoopResult<()> {
        self.enqueue(Task::Unload(app_id))
    }

    /// Stops the loop once every task queued before this call is processed.
    ///
    /// From the loop thread itself the loop stops after the current task.
    pub fn stop(&self) {
        if self.is_loop_thread() {
            self.shared.stop_requested.store(true, Ordering::Release);
        } else if self.tx.send(Task::Stop).is_err() {
            tracing::trace!(loop_name = self.name(), "stop requested on finished loop");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shared.stopped.read()
    }

    pub fn nanoapp_info(&self, app_id: AppId) -> Option<Arc<NanoappInfo>> {
        self.shared.registry.read().get(&app_id).cloned()
    }

    /// Tasks waiting to be processed.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn allocate_instance_id(&self) -> InstanceId {
        loop {
            let id = self.shared.next_instance_id.fetch_add(1, Ordering::Relaxed);
            if id != SYSTEM_INSTANCE_ID {
                return id;
            }
        }
    }

    fn enqueue(&self, task: Task) -> LoopResult<()> {
        self.try_enqueue(task).map_err(|(err, _)| err)
    }

    fn try_enqueue(&self, task: Task) -> Result<(), (LoopError, Task)> {
        let stopped = self.shared.stopped.read();
        if *stopped {
            return Err((LoopError::Stopped, task));
        }
        let is_event = matches!(task, Task::Deliver(_));
        if is_event && !self.reserve_event_slot() {
            return Err((LoopError::QueueFull, task));
        }
        self.tx.try_send(task).map_err(|err| {
            if is_event {
                self.shared.release_event_slot();
            }
            match err {
                TrySendError::Full(task) => (LoopError::QueueFull, task),
                TrySendError::Disconnected(task) => (LoopError::Stopped, task),
            }
        })
    }

    fn reserve_event_slot(&self) -> bool {
        let capacity = self.shared.config.event_queue_capacity;
        self.shared
            .queued_events
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < capacity).then_some(queued + 1)
            })
            .is_ok()
    }
}

impl LoopShared {
    fn release_event_slot(&self) {
        self.queued_events.fetch_sub(1, Ordering::AcqRel);
    }
}

impl EventLoopPort for EventLoopHandle {
    fn find_nanoapp_instance_id(&self, app_id: AppId) -> Option<InstanceId> {
        self.shared
            .registry
            .read()
            .get(&app_id)
            .map(|info| info.instance_id())
    }

    fn post_event(&self, event: Event) -> Result<(), Event> {
        match self.try_enqueue(Task::Deliver(event)) {
            Ok(()) => Ok(()),
            Err((err, Task::Deliver(event))) => {
                tracing::warn!(
                    loop_name = self.name(),
                    event_type = event.event_type,
                    %err,
                    "event post refused"
                );
                Err(event)
            }
            Err(_) => unreachable!("a refused deliver task is handed back unchanged"),
        }
    }

    fn defer_callback(&self, kind: SystemCallbackType, callback: SystemCallback) -> bool {
        match self.enqueue(Task::System { kind, callback }) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(loop_name = self.name(), ?kind, %err, "system callback refused");
                false
            }
        }
    }

    fn is_loop_thread(&self) -> bool {
        *self.shared.owner.lock() == Some(thread::current().id())
    }
}

struct LoadedNanoapp {
    ctx: NanoappContext,
    app: Box<dyn Nanoapp>,
}

/// Owner side of an event loop. Drive it with [`EventLoop::run_until_idle`],
/// [`EventLoop::run`] or [`EventLoop::spawn`].
pub struct EventLoop {
    rx: Receiver<Task>,
    handle: EventLoopHandle,
    nanoapps: HashMap<InstanceId, LoadedNanoapp>,
}

impl EventLoop {
    pub fn new(config: EventLoopConfig) -> Self {
        let (tx, rx) = unbounded();
        let shared = Arc::new(LoopShared {
            config,
            registry: RwLock::new(HashMap::new()),
            next_instance_id: AtomicU16::new(SYSTEM_INSTANCE_ID + 1),
            owner: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            stopped: RwLock::new(false),
            queued_events: AtomicUsize::new(0),
            metrics: LoopMetrics::default(),
        });
        Self {
            rx,
            handle: EventLoopHandle { tx, shared },
            nanoapps: HashMap::new(),
        }
    }

    pub fn handle(&self) -> EventLoopHandle {
        self.handle.clone()
    }

    /// Processes at most one queued task. Returns false when the queue was empty.
    pub fn run_once(&mut self) -> bool {
        self.claim_thread();
        match self.rx.try_recv() {
            Ok(task) => {
                self.process(task);
                true
            }
            Err(_) => false,
        }
    }

    /// Processes tasks until the queue is empty, including tasks queued
    /// while processing. Returns the number of tasks processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut work = 0;
        while self.run_once() {
            work += 1;
        }
        work
    }

    /// Blocks processing tasks until [`EventLoopHandle::stop`] is called.
    ///
    /// Nanoapps are ended on exit. Callbacks still queued are run and events
    /// still queued are dropped.
    pub fn run(mut self) {
        self.claim_thread();
        tracing::debug!(loop_name = self.handle.name(), "event loop running");
        while let Ok(task) = self.rx.recv() {
            if matches!(task, Task::Stop) {
                break;
            }
            self.process(task);
            if self.handle.shared.stop_requested.load(Ordering::Acquire) {
                break;
            }
        }
        self.shutdown();
    }

    /// Runs the loop on its own named thread.
    pub fn spawn(self) -> LoopResult<JoinHandle<()>> {
        let name = self.handle.name().to_string();
        Ok(thread::Builder::new().name(name).spawn(move || self.run())?)
    }

    fn claim_thread(&self) {
        let current = thread::current().id();
        let mut owner = self.handle.shared.owner.lock();
        if *owner != Some(current) {
            *owner = Some(current);
        }
    }

    fn process(&mut self, task: Task) {
        match task {
            Task::Deliver(event) => self.deliver(event),
            Task::System { kind, callback } => {
                tracing::trace!(loop_name = self.handle.name(), ?kind, "running system callback");
                callback();
                self.handle.shared.metrics.record_system_callback();
            }
            Task::Load(request) => self.load(request),
            Task::Unload(app_id) => self.unload(app_id),
            Task::Stop => {}
        }
    }

    fn deliver(&mut self, event: Event) {
        self.handle.shared.release_event_slot();
        let Some(loaded) = self.nanoapps.get_mut(&event.target_instance_id) else {
            tracing::warn!(
                loop_name = self.handle.name(),
                target = event.target_instance_id,
                event_type = event.event_type,
                "dropping event for unknown instance"
            );
            self.handle.shared.metrics.record_dropped();
            return;
        };
        loaded.app.handle_event(&loaded.ctx, &event);
        self.handle.shared.metrics.record_delivered();
        drop(event);
    }

    fn load(&mut self, request: LoadRequest) {
        let LoadRequest { info, mut nanoapp } = request;
        let app_id = info.app_id();
        let instance_id = info.instance_id();
        if self.handle.find_nanoapp_instance_id(app_id).is_some() {
            tracing::error!(
                loop_name = self.handle.name(),
                err = %LoopError::AlreadyLoaded(app_id),
                "load request rejected"
            );
            return;
        }

        let ctx = NanoappContext::new(Arc::clone(&info), self.handle.clone());
        if !nanoapp.start(&ctx) {
            tracing::error!(
                loop_name = self.handle.name(),
                err = %LoopError::StartFailed(app_id),
                "load request rejected"
            );
            return;
        }
        self.handle.shared.registry.write().insert(app_id, info);
        self.nanoapps.insert(instance_id, LoadedNanoapp { ctx, app: nanoapp });
        tracing::debug!(loop_name = self.handle.name(), app_id, instance_id, "nanoapp loaded");
    }

    fn unload(&mut self, app_id: AppId) {
        let Some(info) = self.handle.shared.registry.write().remove(&app_id) else {
            tracing::warn!(loop_name = self.handle.name(), app_id, "unload of unknown nanoapp");
            return;
        };
        if let Some(mut loaded) = self.nanoapps.remove(&info.instance_id()) {
            loaded.app.end(&loaded.ctx);
        }
        tracing::debug!(loop_name = self.handle.name(), app_id, "nanoapp unloaded");
    }

    fn shutdown(&mut self) {
        // Waits out enqueues in flight; everything after this is refused,
        // so the drain below sees every accepted task.
        *self.handle.shared.stopped.write() = true;
        for (_, mut loaded) in self.nanoapps.drain() {
            loaded.app.end(&loaded.ctx);
        }
        self.handle.shared.registry.write().clear();

        while let Ok(task) = self.rx.try_recv() {
            match task {
                Task::System { .. } => self.process(task),
                Task::Deliver(event) => {
                    self.handle.shared.release_event_slot();
                    self.handle.shared.metrics.record_dropped();
                    drop(event);
                }
                Task::Load(_) | Task::Unload(_) | Task::Stop => {}
            }
        }
        tracing::debug!(loop_name = self.handle.name(), "event loop stopped");
    }
}
