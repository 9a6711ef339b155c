//! In-process engine.
//!
//! [`MemoryEngine`] keeps native objects in a table and models the parts of
//! a media framework the graph core relies on: factory instantiation with
//! closed property schemas, static and ghost pads, container membership,
//! single-peer pad links, stepwise state transitions and message routing to
//! the bus of the top-level pipeline.
//!
//! Tests use its control methods to inject failures (refused factories,
//! links, property writes and state changes) and to post messages as if
//! they came from a native object.

use super::{Engine, FactoryCatalog, NativeHandle};
use crate::element::{
    Pad, PadDirection, PadList, PropertySpec, PropertyValue, check_property,
};
use crate::error::{Error, Result};
use crate::pipeline::{Bus, BusMessage, MessageBody, PipelineState, StateChangeReturn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const CONTAINER_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::text("name"),
    PropertySpec::uint("message-forward"),
    PropertySpec::uint("async-handling"),
];

/// Behavior switches for [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryEngineConfig {
    /// Complete state transitions inside `set_state` and post the
    /// state-changed messages immediately. When false, transitions other
    /// than to `Null` stay pending until [`MemoryEngine::confirm_state`].
    pub auto_confirm: bool,

    /// Also post state-changed messages from every descendant, before the
    /// pipeline's own message for the same step.
    pub post_child_state_changes: bool,

    /// Simulated time spent inside each `set_state` call.
    pub state_change_latency: Duration,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            auto_confirm: true,
            post_child_state_changes: true,
            state_change_latency: Duration::ZERO,
        }
    }
}

impl MemoryEngineConfig {
    /// Transitions wait for an explicit confirmation.
    pub fn manual() -> Self {
        Self {
            auto_confirm: false,
            ..Default::default()
        }
    }

    /// Only the pipeline posts state-changed messages.
    pub fn quiet_children() -> Self {
        Self {
            post_child_state_changes: false,
            ..Default::default()
        }
    }

    /// Set the simulated latency of each state change request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.state_change_latency = latency;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ObjectKind {
    Element { factory: String },
    Bin,
    Pipeline,
}

#[derive(Debug)]
struct Object {
    name: String,
    kind: ObjectKind,
    pads: PadList,
    ghost_targets: HashMap<String, u64>,
    properties: HashMap<String, PropertyValue>,
    parent: Option<u64>,
    children: Vec<u64>,
    state: PipelineState,
    pending: Option<PipelineState>,
    peer_out: Option<u64>,
    peer_in: Option<u64>,
}

impl Object {
    fn new(name: &str, kind: ObjectKind, pads: PadList) -> Self {
        Self {
            name: name.to_string(),
            kind,
            pads,
            ghost_targets: HashMap::new(),
            properties: HashMap::new(),
            parent: None,
            children: Vec::new(),
            state: PipelineState::Null,
            pending: None,
            peer_out: None,
            peer_in: None,
        }
    }

    fn is_container(&self) -> bool {
        matches!(self.kind, ObjectKind::Bin | ObjectKind::Pipeline)
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    objects: HashMap<u64, Object>,
    buses: HashMap<u64, Bus>,
    refused_links: HashSet<(String, String)>,
    refused_factories: HashSet<String>,
    refused_properties: HashSet<(String, String)>,
    refuse_state_changes: bool,
}

impl Inner {
    fn insert(&mut self, object: Object) -> NativeHandle {
        self.next_id += 1;
        self.objects.insert(self.next_id, object);
        NativeHandle::from_raw(self.next_id)
    }

    fn get(&self, handle: NativeHandle) -> Result<&Object> {
        self.objects
            .get(&handle.as_raw())
            .ok_or_else(|| Error::Engine(format!("no native object {handle}")))
    }

    fn get_mut(&mut self, handle: NativeHandle) -> Result<&mut Object> {
        self.objects
            .get_mut(&handle.as_raw())
            .ok_or_else(|| Error::Engine(format!("no native object {handle}")))
    }

    fn is_ancestor(&self, candidate: u64, of: u64) -> bool {
        let mut current = self.objects.get(&of).and_then(|o| o.parent);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.objects.get(&id).and_then(|o| o.parent);
        }
        false
    }

    fn root_of(&self, id: u64) -> u64 {
        let mut current = id;
        while let Some(parent) = self.objects.get(&current).and_then(|o| o.parent) {
            current = parent;
        }
        current
    }

    fn descendants(&self, id: u64, out: &mut Vec<u64>) {
        if let Some(obj) = self.objects.get(&id) {
            for &child in &obj.children {
                self.descendants(child, out);
                out.push(child);
            }
        }
    }

    fn bus_for(&self, id: u64) -> Option<Bus> {
        self.buses.get(&self.root_of(id)).cloned()
    }

    /// Move `id` and its descendants one step at a time to `target`,
    /// returning the messages each step produces.
    fn run_transition(
        &mut self,
        id: u64,
        target: PipelineState,
        with_children: bool,
    ) -> Vec<BusMessage> {
        let mut members = Vec::new();
        self.descendants(id, &mut members);

        let mut messages = Vec::new();
        let Some(mut current) = self.objects.get(&id).map(|o| o.state) else {
            return messages;
        };

        while let Some(next) = current.step_toward(target) {
            let pending = (next != target).then_some(target);
            for &member in &members {
                if let Some(obj) = self.objects.get_mut(&member) {
                    let old = obj.state;
                    obj.state = next;
                    if with_children && old != next {
                        messages.push(BusMessage::state_changed(
                            NativeHandle::from_raw(member),
                            obj.name.clone(),
                            old,
                            next,
                            pending,
                        ));
                    }
                }
            }
            if let Some(obj) = self.objects.get_mut(&id) {
                obj.state = next;
                messages.push(BusMessage::state_changed(
                    NativeHandle::from_raw(id),
                    obj.name.clone(),
                    current,
                    next,
                    pending,
                ));
            }
            current = next;
        }

        if let Some(obj) = self.objects.get_mut(&id) {
            obj.pending = None;
        }
        messages
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process [`Engine`] implementation.
#[derive(Debug)]
pub struct MemoryEngine {
    catalog: FactoryCatalog,
    config: MemoryEngineConfig,
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryEngine {
    /// Create an engine with the built-in catalog and default behavior.
    pub fn new() -> Self {
        Self::with_config(FactoryCatalog::new(), MemoryEngineConfig::default())
    }

    /// Create an engine with a custom catalog and behavior.
    pub fn with_config(catalog: FactoryCatalog, config: MemoryEngineConfig) -> Self {
        Self {
            catalog,
            config,
            inner: Mutex::new(Inner::default()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The factory catalog.
    pub fn catalog(&self) -> &FactoryCatalog {
        &self.catalog
    }

    /// Make instantiation of `factory` fail, as if its plugin were missing.
    pub fn refuse_factory(&self, factory: &str) {
        self.lock().refused_factories.insert(factory.to_string());
    }

    /// Make linking the object named `src` to the one named `sink` fail.
    pub fn refuse_link(&self, src: &str, sink: &str) {
        self.lock()
            .refused_links
            .insert((src.to_string(), sink.to_string()));
    }

    /// Make writing `property` on the object named `object` fail.
    pub fn refuse_property(&self, object: &str, property: &str) {
        self.lock()
            .refused_properties
            .insert((object.to_string(), property.to_string()));
    }

    /// Make every subsequent state change request fail (or succeed again).
    pub fn set_refuse_state_changes(&self, refuse: bool) {
        self.lock().refuse_state_changes = refuse;
    }

    /// Post a message as if `source` had emitted it. Returns `true` if it
    /// reached a watch queue.
    pub fn post(&self, source: NativeHandle, body: MessageBody) -> bool {
        let (bus, name) = {
            let inner = self.lock();
            let Ok(obj) = inner.get(source) else {
                return false;
            };
            (inner.bus_for(source.as_raw()), obj.name.clone())
        };
        match bus {
            Some(bus) => bus.post(BusMessage::new(source, name, body)),
            None => false,
        }
    }

    /// Complete a pending transition, posting its state-changed messages.
    /// Returns `false` when nothing was pending.
    pub fn confirm_state(&self, handle: NativeHandle) -> bool {
        let (bus, messages) = {
            let mut inner = self.lock();
            let Some(target) = inner.get(handle).ok().and_then(|o| o.pending) else {
                return false;
            };
            let messages =
                inner.run_transition(handle.as_raw(), target, self.config.post_child_state_changes);
            (inner.bus_for(handle.as_raw()), messages)
        };
        if let Some(bus) = bus {
            for message in messages {
                bus.post(message);
            }
        }
        true
    }

    /// Current native state of an object.
    pub fn current_state(&self, handle: NativeHandle) -> Option<PipelineState> {
        self.lock().get(handle).ok().map(|o| o.state)
    }

    /// Pending target state of an object, if a transition is outstanding.
    pub fn pending_state(&self, handle: NativeHandle) -> Option<PipelineState> {
        self.lock().get(handle).ok().and_then(|o| o.pending)
    }

    /// Check if `src` is natively linked to `sink`.
    pub fn is_linked(&self, src: NativeHandle, sink: NativeHandle) -> bool {
        self.lock()
            .get(src)
            .map(|o| o.peer_out == Some(sink.as_raw()))
            .unwrap_or(false)
    }

    /// Native container of an object.
    pub fn native_parent(&self, handle: NativeHandle) -> Option<NativeHandle> {
        self.lock()
            .get(handle)
            .ok()
            .and_then(|o| o.parent)
            .map(NativeHandle::from_raw)
    }

    /// Names of the ghost pads of a container.
    pub fn ghost_pads(&self, handle: NativeHandle) -> Vec<String> {
        let inner = self.lock();
        let Ok(obj) = inner.get(handle) else {
            return Vec::new();
        };
        let mut names: Vec<String> = obj
            .pads
            .iter()
            .filter(|p| p.is_ghost())
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Number of live native objects.
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Highest number of `set_state` calls observed running at once.
    pub fn peak_concurrent_state_changes(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn create_element(&self, factory: &str, name: &str) -> Result<NativeHandle> {
        let spec = self.catalog.get(factory)?;
        let mut inner = self.lock();
        if inner.refused_factories.contains(factory) {
            return Err(Error::Engine(format!("factory '{factory}' failed to instantiate")));
        }
        let object = Object::new(
            name,
            ObjectKind::Element {
                factory: factory.to_string(),
            },
            PadList::from_templates(&spec.pads),
        );
        Ok(inner.insert(object))
    }

    fn create_bin(&self, name: &str) -> Result<NativeHandle> {
        Ok(self.lock().insert(Object::new(name, ObjectKind::Bin, PadList::new())))
    }

    fn create_pipeline(&self, name: &str) -> Result<NativeHandle> {
        Ok(self
            .lock()
            .insert(Object::new(name, ObjectKind::Pipeline, PadList::new())))
    }

    fn release(&self, handle: NativeHandle) {
        let mut inner = self.lock();
        let id = handle.as_raw();
        let Some(obj) = inner.objects.remove(&id) else {
            return;
        };
        if let Some(parent) = obj.parent.and_then(|p| inner.objects.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
            parent.ghost_targets.retain(|_, &mut t| t != id);
        }
        if let Some(peer) = obj.peer_out.and_then(|p| inner.objects.get_mut(&p)) {
            peer.peer_in = None;
        }
        if let Some(peer) = obj.peer_in.and_then(|p| inner.objects.get_mut(&p)) {
            peer.peer_out = None;
        }
        for child in obj.children {
            if let Some(child) = inner.objects.get_mut(&child) {
                child.parent = None;
            }
        }
        inner.buses.remove(&id);
    }

    fn set_property(&self, handle: NativeHandle, name: &str, value: &PropertyValue) -> Result<()> {
        let mut inner = self.lock();
        let key = (inner.get(handle)?.name.clone(), name.to_string());
        if inner.refused_properties.contains(&key) {
            return Err(Error::Engine(format!("'{}' rejected '{name}'", key.0)));
        }
        let obj = inner.get_mut(handle)?;
        match &obj.kind {
            ObjectKind::Element { factory } => {
                let spec = self.catalog.get(factory)?;
                check_property(factory, &spec.properties, name, value)?;
            }
            ObjectKind::Bin | ObjectKind::Pipeline => {
                check_property("bin", CONTAINER_PROPERTIES, name, value)?;
            }
        }
        obj.properties.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn property(&self, handle: NativeHandle, name: &str) -> Option<PropertyValue> {
        self.lock()
            .get(handle)
            .ok()
            .and_then(|o| o.properties.get(name).cloned())
    }

    fn has_pad(&self, handle: NativeHandle, pad: &str) -> bool {
        self.lock()
            .get(handle)
            .map(|o| o.pads.get(pad).is_some())
            .unwrap_or(false)
    }

    fn first_pad(&self, handle: NativeHandle, direction: PadDirection) -> Option<String> {
        self.lock()
            .get(handle)
            .ok()
            .and_then(|o| o.pads.first(direction))
            .map(|pad| pad.name().to_string())
    }

    fn bin_add(&self, bin: NativeHandle, child: NativeHandle) -> Result<()> {
        let mut inner = self.lock();
        let bin_obj = inner.get(bin)?;
        if !bin_obj.is_container() {
            return Err(Error::Engine(format!("'{}' is not a container", bin_obj.name)));
        }
        let child_obj = inner.get(child)?;
        if child_obj.parent.is_some() {
            return Err(Error::Engine(format!("'{}' already has a parent", child_obj.name)));
        }
        if child == bin || inner.is_ancestor(child.as_raw(), bin.as_raw()) {
            return Err(Error::Engine("container hierarchy would loop".to_string()));
        }
        if matches!(child_obj.kind, ObjectKind::Pipeline) {
            return Err(Error::Engine("a pipeline cannot be nested".to_string()));
        }

        inner.get_mut(child)?.parent = Some(bin.as_raw());
        inner.get_mut(bin)?.children.push(child.as_raw());
        Ok(())
    }

    fn bin_remove(&self, bin: NativeHandle, child: NativeHandle) -> Result<()> {
        let mut inner = self.lock();
        let child_obj = inner.get(child)?;
        if child_obj.parent != Some(bin.as_raw()) {
            return Err(Error::Engine(format!("'{}' is not in that container", child_obj.name)));
        }
        if child_obj.peer_in.is_some() || child_obj.peer_out.is_some() {
            return Err(Error::Engine(format!("'{}' is still linked", child_obj.name)));
        }
        if inner.get(bin)?.ghost_targets.values().any(|&t| t == child.as_raw()) {
            return Err(Error::Engine(format!(
                "'{}' still backs a ghost pad",
                child_obj.name
            )));
        }

        inner.get_mut(child)?.parent = None;
        inner.get_mut(bin)?.children.retain(|&c| c != child.as_raw());
        Ok(())
    }

    fn add_ghost_pad(&self, bin: NativeHandle, target: NativeHandle, pad: &str) -> Result<()> {
        let mut inner = self.lock();
        let target_obj = inner.get(target)?;
        if target_obj.parent != Some(bin.as_raw()) {
            return Err(Error::Engine(format!(
                "'{}' is not a child of the container",
                target_obj.name
            )));
        }
        let target_pad = target_obj
            .pads
            .get(pad)
            .cloned()
            .ok_or_else(|| Error::Engine(format!("'{}' has no pad '{pad}'", target_obj.name)))?;

        let bin_obj = inner.get_mut(bin)?;
        if bin_obj.pads.get(pad).is_some() {
            return Err(Error::Engine(format!("'{}' already has a pad '{pad}'", bin_obj.name)));
        }
        bin_obj.pads.add(Pad::ghost(pad, &target_pad));
        bin_obj.ghost_targets.insert(pad.to_string(), target.as_raw());
        Ok(())
    }

    fn remove_ghost_pad(&self, bin: NativeHandle, pad: &str) -> Result<()> {
        let mut inner = self.lock();
        let bin_obj = inner.get_mut(bin)?;
        let direction = match bin_obj.pads.get(pad) {
            Some(p) if p.is_ghost() => p.direction(),
            _ => return Err(Error::Engine(format!("'{}' has no ghost pad '{pad}'", bin_obj.name))),
        };
        let in_use = match direction {
            PadDirection::Input => bin_obj.peer_in.is_some(),
            PadDirection::Output => bin_obj.peer_out.is_some(),
        };
        if in_use {
            return Err(Error::Engine(format!("ghost pad '{pad}' is linked")));
        }
        bin_obj.pads.remove(pad);
        bin_obj.ghost_targets.remove(pad);
        Ok(())
    }

    fn link(&self, src: NativeHandle, sink: NativeHandle) -> Result<()> {
        let mut inner = self.lock();
        let src_obj = inner.get(src)?;
        let sink_obj = inner.get(sink)?;

        if inner
            .refused_links
            .contains(&(src_obj.name.clone(), sink_obj.name.clone()))
        {
            return Err(Error::Engine("pads are incompatible".to_string()));
        }
        if src_obj.pads.first(PadDirection::Output).is_none() {
            return Err(Error::Engine(format!("'{}' has no output pad", src_obj.name)));
        }
        if sink_obj.pads.first(PadDirection::Input).is_none() {
            return Err(Error::Engine(format!("'{}' has no input pad", sink_obj.name)));
        }
        if src_obj.peer_out.is_some() {
            return Err(Error::Engine(format!("'{}' output is already linked", src_obj.name)));
        }
        if sink_obj.peer_in.is_some() {
            return Err(Error::Engine(format!("'{}' input is already linked", sink_obj.name)));
        }
        if src_obj.parent != sink_obj.parent {
            return Err(Error::Engine("objects are in different containers".to_string()));
        }

        inner.get_mut(src)?.peer_out = Some(sink.as_raw());
        inner.get_mut(sink)?.peer_in = Some(src.as_raw());
        Ok(())
    }

    fn unlink(&self, src: NativeHandle, sink: NativeHandle) {
        let mut inner = self.lock();
        let linked = inner
            .get(src)
            .map(|o| o.peer_out == Some(sink.as_raw()))
            .unwrap_or(false);
        if !linked {
            return;
        }
        if let Ok(obj) = inner.get_mut(src) {
            obj.peer_out = None;
        }
        if let Ok(obj) = inner.get_mut(sink) {
            obj.peer_in = None;
        }
    }

    fn set_state(&self, handle: NativeHandle, state: PipelineState) -> StateChangeReturn {
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        if !self.config.state_change_latency.is_zero() {
            std::thread::sleep(self.config.state_change_latency);
        }

        let (bus, messages, answer) = {
            let mut inner = self.lock();
            if inner.refuse_state_changes {
                return StateChangeReturn::Failure;
            }
            let Ok(obj) = inner.get_mut(handle) else {
                return StateChangeReturn::Failure;
            };
            if obj.state == state {
                obj.pending = None;
                return StateChangeReturn::Success;
            }

            if self.config.auto_confirm || state == PipelineState::Null {
                let messages = inner.run_transition(
                    handle.as_raw(),
                    state,
                    self.config.post_child_state_changes,
                );
                (inner.bus_for(handle.as_raw()), messages, StateChangeReturn::Success)
            } else {
                obj.pending = Some(state);
                (None, Vec::new(), StateChangeReturn::Async)
            }
        };

        if let Some(bus) = bus {
            for message in messages {
                bus.post(message);
            }
        }
        answer
    }

    fn wait_state(&self, handle: NativeHandle, _timeout: Duration) -> (StateChangeReturn, PipelineState) {
        let inner = self.lock();
        match inner.get(handle) {
            Ok(obj) if obj.pending.is_some() => (StateChangeReturn::Async, obj.state),
            Ok(obj) => (StateChangeReturn::Success, obj.state),
            Err(_) => (StateChangeReturn::Failure, PipelineState::Null),
        }
    }

    fn attach_bus(&self, pipeline: NativeHandle, bus: Bus) {
        self.lock().buses.insert(pipeline.as_raw(), bus);
    }

    fn detach_bus(&self, pipeline: NativeHandle) {
        self.lock().buses.remove(&pipeline.as_raw());
    }
}
