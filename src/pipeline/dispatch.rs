//! Bus message dispatch.
//!
//! Two independent paths consume what the engine posts:
//!
//! - the **sync path** runs inline on the posting thread for every message.
//!   It only observes and counts, and always lets the message through.
//! - the **watch path** runs when the controller drains its watch queue. It
//!   logs and republishes messages, and is the only place where the
//!   observable pipeline state changes.

use super::{BusMessage, BusSyncReply, EventSender, MessageBody, PipelineEvent, PipelineState};
use crate::engine::NativeHandle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback run on every confirmed state change, with `(old, new)`.
pub type StateChangeListener = Arc<dyn Fn(PipelineState, PipelineState) + Send + Sync>;

/// Counters kept by the sync path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Every message seen.
    pub messages: u64,
    /// State-changed messages, from any object.
    pub state_changes: u64,
    /// Element-specific messages.
    pub element_messages: u64,
}

/// What the watch path should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchVerdict {
    /// The message changed the observable state.
    StateUpdated,
    /// The message was handled (or ignored); keep watching.
    Continue,
    /// End of stream: stop watching.
    Stop,
}

/// State shared between a controller and its bus handlers.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) pipeline: NativeHandle,
    pub(crate) state: Mutex<PipelineState>,
    pub(crate) listeners: Mutex<Vec<StateChangeListener>>,
    pub(crate) events: EventSender,
    pub(crate) sync: Mutex<SyncStats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(name: &str, pipeline: NativeHandle, events: EventSender) -> Self {
        Self {
            name: name.to_string(),
            pipeline,
            state: Mutex::new(PipelineState::Null),
            listeners: Mutex::new(Vec::new()),
            events,
            sync: Mutex::new(SyncStats::default()),
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    pub(crate) fn sync_stats(&self) -> SyncStats {
        *lock(&self.sync)
    }

    pub(crate) fn listeners(&self) -> MutexGuard<'_, Vec<StateChangeListener>> {
        lock(&self.listeners)
    }

    /// Record a confirmed transition and notify listeners and subscribers.
    pub(crate) fn confirm_state(&self, old: PipelineState, new: PipelineState) {
        *lock(&self.state) = new;

        let listeners = self.listeners().clone();
        for listener in &listeners {
            listener(old, new);
        }
        self.events.send_state_changed(old, new);
        crate::observability::record_state_change(&self.name, new.label());
        tracing::info!(pipeline = %self.name, from = %old, to = %new, "state changed");
    }
}

/// Sync path handler.
pub(crate) fn handle_sync(shared: &Shared, message: &BusMessage) -> BusSyncReply {
    crate::observability::record_bus_message(&shared.name, message.kind().label());

    let mut stats = lock(&shared.sync);
    stats.messages += 1;
    match &message.body {
        MessageBody::StateChanged { .. } => stats.state_changes += 1,
        MessageBody::Element { structure, .. } => {
            stats.element_messages += 1;
            tracing::trace!(source = %message.source_name, structure, "element message");
        }
        _ => {}
    }
    BusSyncReply::Pass
}

/// Watch path handler.
pub(crate) fn handle_watch(shared: &Shared, message: &BusMessage) -> WatchVerdict {
    let node = Some(message.source_name.clone());
    match &message.body {
        MessageBody::Info(text) => {
            tracing::info!(source = %message.source_name, "{text}");
            shared.events.send(PipelineEvent::Info {
                message: text.clone(),
                node,
            });
            WatchVerdict::Continue
        }
        MessageBody::Warning { message: text, debug: detail } => {
            tracing::warn!(source = %message.source_name, debug = ?detail, "{text}");
            shared.events.send_warning(text.clone(), node);
            WatchVerdict::Continue
        }
        MessageBody::Error { message: text, debug: detail } => {
            tracing::error!(source = %message.source_name, debug = ?detail, "{text}");
            shared.events.send_error(text.clone(), node);
            WatchVerdict::Continue
        }
        MessageBody::StateChanged { old, new, .. } => {
            if message.source != shared.pipeline {
                tracing::trace!(
                    source = %message.source_name,
                    from = %old,
                    to = %new,
                    "ignoring state change of a child"
                );
                return WatchVerdict::Continue;
            }
            shared.confirm_state(*old, *new);
            WatchVerdict::StateUpdated
        }
        MessageBody::Eos => {
            tracing::info!(pipeline = %shared.name, "end of stream");
            shared.events.send_eos();
            WatchVerdict::Stop
        }
        MessageBody::Element { structure, .. } => {
            shared.events.send(PipelineEvent::Element {
                node: message.source_name.clone(),
                structure: structure.clone(),
            });
            WatchVerdict::Continue
        }
        _ => {
            tracing::debug!(
                source = %message.source_name,
                kind = message.kind().label(),
                "unhandled bus message"
            );
            WatchVerdict::Continue
        }
    }
}
