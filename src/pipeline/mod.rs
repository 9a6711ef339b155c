//! Pipeline lifecycle and bus dispatch.
//!
//! - [`PipelineController`]: owns a root bin and drives it through
//!   [`PipelineState`]s
//! - [`Bus`]: feed of [`BusMessage`]s from the engine, with an inline sync
//!   handler and a bounded watch queue
//! - [`PipelineEvent`]: async republication of what the controller observed
//!
//! # Example
//!
//! ```rust,ignore
//! use bingraph::prelude::*;
//!
//! let graph = Graph::new(Arc::new(MemoryEngine::new())).into_shared();
//! let controller = PipelineController::with_defaults(graph, "pipeline")?;
//! let mut events = controller.subscribe();
//!
//! controller.play();
//! controller.dispatch_pending();
//! assert!(events.wait_state(PipelineState::Playing).await);
//! ```

mod bus;
mod config;
mod controller;
mod dispatch;
mod events;
mod state;

pub use bus::{Bus, BusMessage, BusReceiver, BusSyncReply, MessageBody, MessageKind, SyncHandler};
pub use config::ControllerConfig;
pub use controller::PipelineController;
pub use dispatch::{StateChangeListener, SyncStats};
pub use events::{EventReceiver, EventSender, EventStream, PipelineEvent};
pub use state::{PipelineState, StateChangeReturn};
