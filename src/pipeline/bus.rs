//! Message bus between the engine and the pipeline controller.
//!
//! Every message posted on the [`Bus`] first runs through the sync handler
//! on the posting thread (the engine's delivery thread). Unless the handler
//! drops it, the message is then queued on a bounded channel that the
//! controller drains on its watch path. Closing the bus cancels the watch
//! path.
//!
//! State-changed and end-of-stream messages are never lost: when the
//! channel is full they wait in an unbounded overflow queue that the
//! receiver drains after the channel. While the overflow holds anything,
//! other messages are dropped rather than overtaking it.

use crate::engine::NativeHandle;
use crate::pipeline::PipelineState;
use kanal::{Receiver, Sender, bounded};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Type discriminator of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Informational message.
    Info,
    /// Non-fatal warning.
    Warning,
    /// Error.
    Error,
    /// Stream tags.
    Tag,
    /// Buffering progress.
    Buffering,
    /// An object changed state.
    StateChanged,
    /// A step operation completed.
    StepDone,
    /// The pipeline clock was lost.
    ClockLost,
    /// A new clock was selected.
    NewClock,
    /// Streaming thread status.
    StreamStatus,
    /// End of stream.
    Eos,
    /// Element-specific structured message.
    Element,
    /// Anything else.
    Unknown,
}

impl MessageKind {
    /// Diagnostic label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Info => "MESSAGE_INFO",
            MessageKind::Warning => "MESSAGE_WARNING",
            MessageKind::Error => "MESSAGE_ERROR",
            MessageKind::Tag => "MESSAGE_TAG",
            MessageKind::Buffering => "MESSAGE_BUFFERING",
            MessageKind::StateChanged => "MESSAGE_STATE_CHANGED",
            MessageKind::StepDone => "MESSAGE_STEP_DONE",
            MessageKind::ClockLost => "MESSAGE_CLOCK_LOST",
            MessageKind::NewClock => "MESSAGE_NEW_CLOCK",
            MessageKind::StreamStatus => "MESSAGE_STREAM_STATUS",
            MessageKind::Eos => "MESSAGE_EOS",
            MessageKind::Element => "MESSAGE_ELEMENT",
            MessageKind::Unknown => "MESSAGE_UNKNOWN",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Payload of a bus message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Informational text.
    Info(String),
    /// Warning text plus optional debug detail.
    Warning {
        /// Warning text.
        message: String,
        /// Debug detail.
        debug: Option<String>,
    },
    /// Error text plus optional debug detail.
    Error {
        /// Error text.
        message: String,
        /// Debug detail.
        debug: Option<String>,
    },
    /// Stream tags as name/value pairs.
    Tag(Vec<(String, String)>),
    /// Buffering percentage.
    Buffering(u8),
    /// State transition of the source object.
    StateChanged {
        /// Previous state.
        old: PipelineState,
        /// New state.
        new: PipelineState,
        /// Final target, if more steps follow.
        pending: Option<PipelineState>,
    },
    /// Step done.
    StepDone,
    /// Clock lost.
    ClockLost,
    /// New clock.
    NewClock,
    /// Stream status.
    StreamStatus,
    /// End of stream.
    Eos,
    /// Element-specific structure.
    Element {
        /// Structure name.
        structure: String,
        /// Structure fields.
        fields: Vec<(String, String)>,
    },
    /// Unrecognized message.
    Unknown,
}

/// A message posted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Native object that posted the message.
    pub source: NativeHandle,
    /// Name of that object.
    pub source_name: String,
    /// Payload.
    pub body: MessageBody,
}

impl BusMessage {
    /// Create a message.
    pub fn new(source: NativeHandle, source_name: impl Into<String>, body: MessageBody) -> Self {
        Self {
            source,
            source_name: source_name.into(),
            body,
        }
    }

    /// Create a state-changed message.
    pub fn state_changed(
        source: NativeHandle,
        source_name: impl Into<String>,
        old: PipelineState,
        new: PipelineState,
        pending: Option<PipelineState>,
    ) -> Self {
        Self::new(
            source,
            source_name,
            MessageBody::StateChanged { old, new, pending },
        )
    }

    /// Create an end-of-stream message.
    pub fn eos(source: NativeHandle, source_name: impl Into<String>) -> Self {
        Self::new(source, source_name, MessageBody::Eos)
    }

    /// Type discriminator of this message.
    pub fn kind(&self) -> MessageKind {
        match &self.body {
            MessageBody::Info(_) => MessageKind::Info,
            MessageBody::Warning { .. } => MessageKind::Warning,
            MessageBody::Error { .. } => MessageKind::Error,
            MessageBody::Tag(_) => MessageKind::Tag,
            MessageBody::Buffering(_) => MessageKind::Buffering,
            MessageBody::StateChanged { .. } => MessageKind::StateChanged,
            MessageBody::StepDone => MessageKind::StepDone,
            MessageBody::ClockLost => MessageKind::ClockLost,
            MessageBody::NewClock => MessageKind::NewClock,
            MessageBody::StreamStatus => MessageKind::StreamStatus,
            MessageBody::Eos => MessageKind::Eos,
            MessageBody::Element { .. } => MessageKind::Element,
            MessageBody::Unknown => MessageKind::Unknown,
        }
    }

    /// Check if losing this message would desynchronize the watch path.
    pub fn is_lossless(&self) -> bool {
        matches!(self.body, MessageBody::StateChanged { .. } | MessageBody::Eos)
    }
}

/// Verdict of the sync handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSyncReply {
    /// Queue the message for the watch path.
    Pass,
    /// Discard the message.
    Drop,
}

/// Handler run inline on the posting thread.
pub type SyncHandler = Arc<dyn Fn(&BusMessage) -> BusSyncReply + Send + Sync>;

/// Overflow of lossless messages, plus the signal for waiting receivers.
#[derive(Default)]
struct Backlog {
    overflow: Mutex<VecDeque<BusMessage>>,
    ready: Condvar,
}

impl Backlog {
    fn lock(&self) -> MutexGuard<'_, VecDeque<BusMessage>> {
        self.overflow.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct BusInner {
    sender: Sender<BusMessage>,
    sync_handler: RwLock<Option<SyncHandler>>,
    backlog: Arc<Backlog>,
    dropped: AtomicU64,
}

/// Posting side of the bus. Cheap to clone.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Create a bus whose watch queue holds up to `capacity` messages.
    pub fn new(capacity: usize) -> (Self, BusReceiver) {
        let (sender, receiver) = bounded(capacity);
        let backlog = Arc::new(Backlog::default());
        let bus = Self {
            inner: Arc::new(BusInner {
                sender,
                sync_handler: RwLock::new(None),
                backlog: backlog.clone(),
                dropped: AtomicU64::new(0),
            }),
        };
        (bus, BusReceiver { receiver, backlog })
    }

    /// Install the sync handler, replacing any previous one.
    pub fn set_sync_handler(&self, handler: SyncHandler) {
        *self
            .inner
            .sync_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Remove the sync handler.
    pub fn clear_sync_handler(&self) {
        *self
            .inner
            .sync_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Post a message.
    ///
    /// Returns `true` if the message was queued for the watch path. A full
    /// queue drops the message and counts it, unless the message is
    /// [lossless](BusMessage::is_lossless), in which case it overflows.
    pub fn post(&self, message: BusMessage) -> bool {
        let handler = self
            .inner
            .sync_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(handler) = handler
            && handler(&message) == BusSyncReply::Drop
        {
            return false;
        }

        if self.is_closed() {
            return false;
        }

        // Posters are serialized on the overflow so nothing reaches the
        // channel while older messages wait in the overflow.
        let mut overflow = self.inner.backlog.lock();
        let mut slot = Some(message);
        if overflow.is_empty() {
            match self.inner.sender.try_send_option(&mut slot) {
                Ok(true) => {
                    self.inner.backlog.ready.notify_all();
                    return true;
                }
                Ok(false) => {}
                Err(_) => return false,
            }
        }
        let Some(message) = slot else {
            return false;
        };

        if message.is_lossless() {
            tracing::debug!(
                source = %message.source_name,
                kind = message.kind().label(),
                "bus watch queue full, message overflowed"
            );
            overflow.push_back(message);
            self.inner.backlog.ready.notify_all();
            true
        } else {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            crate::observability::record_bus_dropped();
            tracing::warn!(kind = message.kind().label(), "bus watch queue full, message dropped");
            false
        }
    }

    /// Close the bus. Queued messages are discarded and the watch path ends.
    pub fn close(&self) {
        let mut overflow = self.inner.backlog.lock();
        let _ = self.inner.sender.close();
        overflow.clear();
        self.inner.backlog.ready.notify_all();
    }

    /// Check if the bus has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.sender.is_closed()
    }

    /// Number of messages dropped because the watch queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("queued", &self.inner.sender.len())
            .field("overflowed", &self.inner.backlog.lock().len())
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Watch side of the bus.
pub struct BusReceiver {
    receiver: Receiver<BusMessage>,
    backlog: Arc<Backlog>,
}

impl BusReceiver {
    /// Take the next queued message without blocking.
    pub fn try_recv(&self) -> Option<BusMessage> {
        let mut overflow = self.backlog.lock();
        match self.receiver.try_recv() {
            Ok(Some(message)) => Some(message),
            Ok(None) => overflow.pop_front(),
            Err(_) => None,
        }
    }

    /// Wait for the next message. `None` once the bus is closed.
    pub fn recv(&self) -> Option<BusMessage> {
        // The overflow only fills while the channel is full, so an empty
        // channel with an empty overflow is safe to block on.
        self.try_recv().or_else(|| self.receiver.recv().ok())
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BusMessage> {
        self.try_recv()
            .or_else(|| self.receiver.recv_timeout(timeout).ok())
    }

    /// Number of queued messages, overflow included.
    pub fn len(&self) -> usize {
        self.receiver.len() + self.backlog.lock().len()
    }

    /// Check if no message is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the bus has been closed.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Block until a message is queued or the bus closes, for at most
    /// `timeout`. Nothing is taken off the queue. Returns `false` on
    /// timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut overflow = self.backlog.lock();
        while overflow.is_empty() && self.receiver.is_empty() && !self.receiver.is_closed() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            overflow = self
                .backlog
                .ready
                .wait_timeout(overflow, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
