//! Async pipeline events.
//!
//! The controller republishes what it learns from the bus (confirmed state
//! changes, end of stream, errors and warnings) on a broadcast channel so
//! async code can wait for them.

use super::PipelineState;
use std::fmt;
use tokio::sync::broadcast;

/// Events published by a pipeline controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The pipeline confirmed a state change.
    StateChanged {
        /// Previous state.
        from: PipelineState,
        /// New state.
        to: PipelineState,
    },

    /// End of stream reached.
    Eos,

    /// An object reported an error.
    Error {
        /// The error message.
        message: String,
        /// The object that reported it (if known).
        node: Option<String>,
    },

    /// An object reported a non-fatal problem.
    Warning {
        /// The warning message.
        message: String,
        /// The object that reported it (if known).
        node: Option<String>,
    },

    /// Informational message.
    Info {
        /// The message.
        message: String,
        /// The object that posted it.
        node: Option<String>,
    },

    /// Element-specific message.
    Element {
        /// The element that posted it.
        node: String,
        /// Structure name.
        structure: String,
    },

    /// The pipeline was forced to `Null`.
    Stopped,
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::StateChanged { from, to } => {
                write!(f, "StateChanged: {} -> {}", from, to)
            }
            PipelineEvent::Eos => write!(f, "EOS"),
            PipelineEvent::Error { message, node } => match node {
                Some(n) => write!(f, "Error in {}: {}", n, message),
                None => write!(f, "Error: {}", message),
            },
            PipelineEvent::Warning { message, node } => match node {
                Some(n) => write!(f, "Warning in {}: {}", n, message),
                None => write!(f, "Warning: {}", message),
            },
            PipelineEvent::Info { message, node } => match node {
                Some(n) => write!(f, "Info from {}: {}", n, message),
                None => write!(f, "Info: {}", message),
            },
            PipelineEvent::Element { node, structure } => {
                write!(f, "Element message '{}' from {}", structure, node)
            }
            PipelineEvent::Stopped => write!(f, "Pipeline stopped"),
        }
    }
}

/// Sender for pipeline events.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that got it; zero when nobody is
    /// subscribed.
    pub fn send(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Send an EOS event.
    pub fn send_eos(&self) {
        self.send(PipelineEvent::Eos);
    }

    /// Send an error event.
    pub fn send_error(&self, message: impl Into<String>, node: Option<String>) {
        self.send(PipelineEvent::Error {
            message: message.into(),
            node,
        });
    }

    /// Send a warning event.
    pub fn send_warning(&self, message: impl Into<String>, node: Option<String>) {
        self.send(PipelineEvent::Warning {
            message: message.into(),
            node,
        });
    }

    /// Send a state changed event.
    pub fn send_state_changed(&self, from: PipelineState, to: PipelineState) {
        self.send(PipelineEvent::StateChanged { from, to });
    }

    /// Create a receiver for events sent from now on.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Create a stream of events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Receiver for pipeline events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once every sender is gone. Events missed because the
    /// receiver lagged behind are skipped.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "event receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait for EOS or an error.
    ///
    /// Returns `Ok(())` on EOS, `Err(message)` on error.
    pub async fn wait_eos(&mut self) -> Result<(), String> {
        while let Some(event) = self.recv().await {
            match event {
                PipelineEvent::Eos => return Ok(()),
                PipelineEvent::Error { message, node } => {
                    return Err(match node {
                        Some(n) => format!("Error in {}: {}", n, message),
                        None => message,
                    });
                }
                _ => continue,
            }
        }
        Err("Event channel closed unexpectedly".to_string())
    }

    /// Wait until the pipeline confirms `state`.
    pub async fn wait_state(&mut self, state: PipelineState) -> bool {
        while let Some(event) = self.recv().await {
            if let PipelineEvent::StateChanged { to, .. } = event
                && to == state
            {
                return true;
            }
        }
        false
    }
}

/// A stream adapter for receiving events.
pub struct EventStream {
    receiver: EventReceiver,
}

impl EventStream {
    /// Create a new event stream from a receiver.
    pub fn new(receiver: EventReceiver) -> Self {
        Self { receiver }
    }
}

impl futures::Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let fut = self.receiver.recv();
        tokio::pin!(fut);
        fut.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_event_send_recv() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        sender.send_eos();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, PipelineEvent::Eos);
    }

    #[tokio::test]
    async fn test_multiple_receivers() {
        let sender = EventSender::new(16);
        let mut receiver1 = sender.subscribe();
        let mut receiver2 = sender.subscribe();

        sender.send_state_changed(PipelineState::Paused, PipelineState::Playing);

        let e1 = receiver1.recv().await.unwrap();
        let e2 = receiver2.recv().await.unwrap();
        assert!(matches!(e1, PipelineEvent::StateChanged { .. }));
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_wait_eos() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        let sender_clone = sender.clone();
        tokio::spawn(async move {
            sender_clone.send_state_changed(PipelineState::Paused, PipelineState::Playing);
            sender_clone.send_warning("late buffer", Some("sink".to_string()));
            sender_clone.send_eos();
        });

        assert!(receiver.wait_eos().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_eos_error() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        let sender_clone = sender.clone();
        tokio::spawn(async move {
            sender_clone.send_error("decoder failed", Some("src".to_string()));
        });

        let result = receiver.wait_eos().await;
        assert_eq!(result.unwrap_err(), "Error in src: decoder failed");
    }

    #[tokio::test]
    async fn test_stream() {
        let sender = EventSender::new(16);
        let mut stream = sender.stream();
        sender.send(PipelineEvent::Stopped);
        assert_eq!(stream.next().await, Some(PipelineEvent::Stopped));
    }

    #[test]
    fn test_event_display() {
        let event = PipelineEvent::Error {
            message: "test error".to_string(),
            node: Some("node1".to_string()),
        };
        assert_eq!(format!("{}", event), "Error in node1: test error");
        assert_eq!(
            PipelineEvent::StateChanged {
                from: PipelineState::Null,
                to: PipelineState::Ready
            }
            .to_string(),
            "StateChanged: STATE_NULL -> STATE_READY"
        );
    }
}
