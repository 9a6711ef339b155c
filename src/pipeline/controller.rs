//! Pipeline controller.
//!
//! A [`PipelineController`] owns the root bin of one pipeline, the bus the
//! engine posts to and the observable state machine. Requests (`play`,
//! `pause`, `stop`) and the two dispatch paths are serialized by three
//! separate locks, so a long state change never blocks message dispatch and
//! the other way round. The watch lock is held for one message at a time;
//! a blocked [`PipelineController::run_watch`] waits without holding it.

use super::dispatch::{self, Shared, StateChangeListener, SyncStats, WatchVerdict};
use super::{Bus, BusMessage, BusReceiver, ControllerConfig, EventReceiver, EventSender, PipelineEvent};
use super::{PipelineState, StateChangeReturn};
use crate::engine::{Engine, NativeHandle};
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId, SharedGraph};
use crate::observability::PipelineMetrics;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest a blocked watch sleeps before rechecking for cancellation.
const WATCH_POLL: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one pipeline through its lifecycle.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Arc::new(MemoryEngine::new());
/// let graph = Graph::new(engine).into_shared();
/// let controller = PipelineController::new(graph.clone(), "pipeline", ControllerConfig::default())?;
///
/// let src = graph.lock().unwrap().new_element("v4l2src", "camera")?;
/// let sink = graph.lock().unwrap().new_element("fakesink", "sink")?;
/// controller.add_child(src)?;
/// controller.add_child(sink)?;
/// controller.link_all();
///
/// controller.play();
/// controller.dispatch_pending();
/// assert_eq!(controller.state(), PipelineState::Playing);
/// ```
pub struct PipelineController {
    graph: SharedGraph,
    engine: Arc<dyn Engine>,
    root: NodeId,
    handle: NativeHandle,
    bus: Bus,
    config: ControllerConfig,
    shared: Arc<Shared>,
    metrics: PipelineMetrics,
    lifecycle: Mutex<()>,
    receiver: BusReceiver,
    watching: Mutex<bool>,
}

impl PipelineController {
    /// Create a pipeline named `name` in `graph`.
    pub fn new(graph: SharedGraph, name: &str, config: ControllerConfig) -> Result<Self> {
        crate::observability::init_metrics();

        let (root, handle, engine) = {
            let mut g = lock(&graph);
            let root = g.new_pipeline_bin(name)?;
            let handle = g.handle(root).ok_or(Error::NodeNotFound)?;
            (root, handle, g.engine().clone())
        };

        let shared = Arc::new(Shared::new(
            name,
            handle,
            EventSender::new(config.publish_capacity),
        ));
        let (bus, receiver) = Bus::new(config.watch_capacity);
        let sync_shared = shared.clone();
        bus.set_sync_handler(Arc::new(move |message: &BusMessage| {
            dispatch::handle_sync(&sync_shared, message)
        }));
        engine.attach_bus(handle, bus.clone());

        tracing::info!(pipeline = name, %handle, "pipeline created");
        Ok(Self {
            graph,
            engine,
            root,
            handle,
            bus,
            config,
            shared,
            metrics: PipelineMetrics::new(name),
            lifecycle: Mutex::new(()),
            receiver,
            watching: Mutex::new(true),
        })
    }

    /// Create a pipeline with the default configuration.
    pub fn with_defaults(graph: SharedGraph, name: &str) -> Result<Self> {
        Self::new(graph, name, ControllerConfig::default())
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Root bin of the pipeline.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Native pipeline object.
    pub fn native_handle(&self) -> NativeHandle {
        self.handle
    }

    /// The graph the pipeline lives in.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// The bus the engine posts to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn graph_lock(&self) -> MutexGuard<'_, Graph> {
        lock(&self.graph)
    }

    /// Add a node to the root bin.
    pub fn add_child(&self, child: NodeId) -> Result<()> {
        self.graph_lock().add_child(self.root, child)
    }

    /// Remove a node from the root bin.
    pub fn remove_child(&self, child: NodeId) -> Result<()> {
        self.graph_lock().remove_child(self.root, child)
    }

    /// Link the root bin's children in insertion order.
    pub fn link_all(&self) -> bool {
        self.graph_lock().link_all(self.root)
    }

    /// Unlink the root bin's children.
    pub fn unlink_all(&self) {
        self.graph_lock().unlink_all(self.root)
    }

    /// Check if the root bin is linked.
    pub fn is_linked(&self) -> bool {
        self.graph_lock().is_linked(self.root)
    }

    fn request_state(&self, request: &str, target: PipelineState) -> bool {
        let _guard = lock(&self.lifecycle);
        let _span = self.config.tracing.pipeline(self.name()).entered();

        let answer = self.engine.set_state(self.handle, target);
        self.metrics.record_request(request, !answer.is_accepted());
        if answer.is_accepted() {
            tracing::info!(to = %target, ?answer, "state change requested");
            true
        } else {
            tracing::error!(to = %target, "engine refused state change");
            false
        }
    }

    /// Request `Playing`. The observable state follows once the pipeline
    /// confirms it on the bus.
    pub fn play(&self) -> bool {
        self.request_state("play", PipelineState::Playing)
    }

    /// Request `Paused`. The observable state follows once the pipeline
    /// confirms it on the bus.
    pub fn pause(&self) -> bool {
        self.request_state("pause", PipelineState::Paused)
    }

    /// Force the pipeline to `Null` and wait for the engine to settle.
    ///
    /// Messages already queued are dispatched first, so listeners see the
    /// transitions in order, then the observable state is set to `Null`.
    /// Returns `false` if the engine did not confirm in time.
    pub fn stop(&self) -> bool {
        let _guard = lock(&self.lifecycle);
        let _span = self.config.tracing.pipeline(self.name()).entered();
        self.force_null()
    }

    /// Request `Null`, wait for the engine, then drain the watch queue and
    /// force the observable state. Callers hold the lifecycle lock.
    fn force_null(&self) -> bool {
        let answer = self.engine.set_state(self.handle, PipelineState::Null);
        self.metrics.record_request("stop", !answer.is_accepted());
        let (result, current) = self
            .engine
            .wait_state(self.handle, self.config.state_timeout);
        self.dispatch_pending();

        let old = self.shared.state();
        if old != PipelineState::Null {
            self.shared.confirm_state(old, PipelineState::Null);
        }
        self.shared.events.send(PipelineEvent::Stopped);

        let confirmed = answer.is_accepted()
            && result != StateChangeReturn::Failure
            && current == PipelineState::Null;
        if confirmed {
            tracing::info!("pipeline stopped");
        } else {
            tracing::warn!(?answer, ?result, %current, "engine did not confirm stop");
        }
        confirmed
    }

    /// Last state confirmed by the pipeline.
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Register a listener for confirmed state changes.
    ///
    /// Fails with [`Error::ListenerNotUnique`] if this exact listener is
    /// already registered.
    pub fn add_state_change_listener(&self, listener: StateChangeListener) -> Result<()> {
        let mut listeners = self.shared.listeners();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return Err(Error::ListenerNotUnique);
        }
        listeners.push(listener);
        Ok(())
    }

    /// Unregister a listener.
    pub fn remove_state_change_listener(&self, listener: &StateChangeListener) -> Result<()> {
        let mut listeners = self.shared.listeners();
        let position = listeners
            .iter()
            .position(|l| same_listener(l, listener))
            .ok_or(Error::ListenerNotFound)?;
        listeners.remove(position);
        Ok(())
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners().len()
    }

    /// Subscribe to async pipeline events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// The event publisher.
    pub fn events(&self) -> &EventSender {
        &self.shared.events
    }

    /// Counters kept by the sync path.
    pub fn sync_stats(&self) -> SyncStats {
        self.shared.sync_stats()
    }

    /// Whether the watch path is still consuming messages.
    pub fn is_watching(&self) -> bool {
        *lock(&self.watching) && !self.bus.is_closed()
    }

    /// Take and handle one queued message under the watch lock.
    fn dispatch_one(&self) -> Dispatched {
        let mut watching = lock(&self.watching);
        if !*watching {
            return Dispatched::Finished;
        }
        let Some(message) = self.receiver.try_recv() else {
            if self.receiver.is_closed() {
                *watching = false;
                return Dispatched::Finished;
            }
            return Dispatched::Idle;
        };
        if dispatch::handle_watch(&self.shared, &message) == WatchVerdict::Stop {
            *watching = false;
        }
        Dispatched::Handled
    }

    /// Dispatch every queued message without blocking. Returns the number
    /// of messages handled.
    pub fn dispatch_pending(&self) -> usize {
        let mut handled = 0;
        while self.dispatch_one() == Dispatched::Handled {
            handled += 1;
        }
        handled
    }

    /// Dispatch messages as they arrive until end of stream or until the
    /// watch is cancelled. Returns the number of messages handled.
    ///
    /// Lifecycle requests and [`dispatch_pending`](Self::dispatch_pending)
    /// on other threads interleave with this loop between messages.
    pub fn run_watch(&self) -> usize {
        let mut handled = 0;
        loop {
            match self.dispatch_one() {
                Dispatched::Handled => handled += 1,
                Dispatched::Idle => {
                    self.receiver.wait(WATCH_POLL);
                }
                Dispatched::Finished => break,
            }
        }
        handled
    }

    /// Cancel the watch path. A blocked [`run_watch`](Self::run_watch)
    /// returns and later dispatch calls do nothing.
    pub fn cancel_watch(&self) {
        self.bus.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatched {
    Handled,
    Idle,
    Finished,
}

fn same_listener(a: &StateChangeListener, b: &StateChangeListener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("name", &self.shared.name)
            .field("handle", &self.handle)
            .field("state", &self.shared.state())
            .field("bus", &self.bus)
            .finish()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        let _guard = lock(&self.lifecycle);
        if !self.force_null() {
            tracing::warn!(pipeline = %self.shared.name, "tearing down before the engine reached Null");
        }
        self.engine.detach_bus(self.handle);
        self.bus.clear_sync_handler();
        self.bus.close();

        let mut graph = lock(&self.graph);
        graph.unlink_all(self.root);
        for child in graph.children(self.root) {
            if let Err(e) = graph.remove_child(self.root, child) {
                tracing::warn!(pipeline = %self.shared.name, error = %e, "child left attached");
            }
        }
        if let Err(e) = graph.destroy(self.root) {
            tracing::warn!(pipeline = %self.shared.name, error = %e, "root not destroyed");
        }
        tracing::debug!(pipeline = %self.shared.name, "pipeline torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FactoryCatalog, MemoryEngine, MemoryEngineConfig};
    use crate::pipeline::MessageBody;

    fn setup(config: MemoryEngineConfig) -> (Arc<MemoryEngine>, SharedGraph, PipelineController) {
        let engine = Arc::new(MemoryEngine::with_config(FactoryCatalog::new(), config));
        let graph = Graph::new(engine.clone()).into_shared();
        let controller =
            PipelineController::new(graph.clone(), "pipeline", ControllerConfig::testing()).unwrap();
        (engine, graph, controller)
    }

    #[test]
    fn test_play_confirms_on_dispatch() {
        let (_engine, _graph, controller) = setup(MemoryEngineConfig::default());
        assert_eq!(controller.state(), PipelineState::Null);

        assert!(controller.play());
        assert_eq!(controller.state(), PipelineState::Null);
        controller.dispatch_pending();
        assert_eq!(controller.state(), PipelineState::Playing);
    }

    #[test]
    fn test_refused_play_keeps_state() {
        let (engine, _graph, controller) = setup(MemoryEngineConfig::default());
        engine.set_refuse_state_changes(true);
        assert!(!controller.play());
        controller.dispatch_pending();
        assert_eq!(controller.state(), PipelineState::Null);
    }

    #[test]
    fn test_manual_confirmation() {
        let (engine, _graph, controller) = setup(MemoryEngineConfig::manual());
        assert!(controller.pause());
        controller.dispatch_pending();
        assert_eq!(controller.state(), PipelineState::Null);

        engine.confirm_state(controller.native_handle());
        controller.dispatch_pending();
        assert_eq!(controller.state(), PipelineState::Paused);
    }

    #[test]
    fn test_stop_is_synchronous() {
        let (_engine, _graph, controller) = setup(MemoryEngineConfig::default());
        controller.play();
        controller.dispatch_pending();

        assert!(controller.stop());
        assert_eq!(controller.state(), PipelineState::Null);
        assert_eq!(controller.dispatch_pending(), 0);
    }

    #[test]
    fn test_eos_ends_watch() {
        let (engine, _graph, controller) = setup(MemoryEngineConfig::default());
        engine.post(controller.native_handle(), MessageBody::Eos);
        engine.post(controller.native_handle(), MessageBody::Info("late".to_string()));

        assert_eq!(controller.dispatch_pending(), 1);
        assert!(!controller.is_watching());
        assert_eq!(controller.dispatch_pending(), 0);
    }

    #[test]
    fn test_cancel_unblocks_run_watch() {
        let (_engine, _graph, controller) = setup(MemoryEngineConfig::default());
        controller.cancel_watch();
        assert_eq!(controller.run_watch(), 0);
        assert!(!controller.is_watching());
    }

    #[test]
    fn test_listener_identity() {
        let (_engine, _graph, controller) = setup(MemoryEngineConfig::default());
        let listener: StateChangeListener = Arc::new(|_: PipelineState, _: PipelineState| {});
        let other: StateChangeListener = Arc::new(|_: PipelineState, _: PipelineState| {});

        controller.add_state_change_listener(listener.clone()).unwrap();
        assert_eq!(
            controller.add_state_change_listener(listener.clone()).unwrap_err(),
            Error::ListenerNotUnique
        );
        assert_eq!(
            controller.remove_state_change_listener(&other).unwrap_err(),
            Error::ListenerNotFound
        );
        controller.remove_state_change_listener(&listener).unwrap();
        assert_eq!(controller.listener_count(), 0);
    }

    #[test]
    fn test_drop_settles_to_null_first() {
        let (engine, graph, controller) = setup(MemoryEngineConfig::manual());
        let q = lock(&graph).new_element("queue", "q").unwrap();
        controller.add_child(q).unwrap();
        assert!(controller.play());
        assert!(engine.confirm_state(controller.native_handle()));
        controller.dispatch_pending();
        assert_eq!(controller.state(), PipelineState::Playing);

        let mut events = controller.subscribe();
        drop(controller);

        let events: Vec<_> = std::iter::from_fn(|| events.try_recv()).collect();
        assert_eq!(
            events,
            [
                PipelineEvent::StateChanged {
                    from: PipelineState::Playing,
                    to: PipelineState::Paused
                },
                PipelineEvent::StateChanged {
                    from: PipelineState::Paused,
                    to: PipelineState::Ready
                },
                PipelineEvent::StateChanged {
                    from: PipelineState::Ready,
                    to: PipelineState::Null
                },
                PipelineEvent::Stopped,
            ]
        );
        let q_handle = lock(&graph).handle(q).unwrap();
        assert_eq!(engine.current_state(q_handle), Some(PipelineState::Null));
    }

    #[test]
    fn test_drop_releases_root() {
        let (engine, graph, controller) = setup(MemoryEngineConfig::default());
        let q = lock(&graph).new_element("queue", "q").unwrap();
        controller.add_child(q).unwrap();
        assert!(controller.link_all());
        controller.play();
        drop(controller);

        let g = lock(&graph);
        assert!(g.contains(q));
        assert_eq!(g.parent(q), None);
        assert_eq!(g.len(), 1);
        assert_eq!(engine.object_count(), 1);
    }
}
