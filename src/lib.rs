//! # bingraph
//!
//! Bin composition and pipeline lifecycle control for hardware-accelerated
//! video analytics pipelines.
//!
//! bingraph keeps an arena of named nodes (elements and bins) in a
//! [`graph::Graph`], mirrors every structural change onto a native media
//! [`engine::Engine`], and drives whole pipelines through their state
//! lifecycle with a [`pipeline::PipelineController`]. Ready-made component
//! bins (camera and URI sources, an on-screen display, a primary detector,
//! a reporter tap) live in [`bins`]; [`registry::Registry`] exposes all of it
//! by name.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bingraph::prelude::*;
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new(Arc::new(MemoryEngine::new()));
//! registry.source_uri_new("camera", UriSettings::new("rtsp://host/stream"))?;
//! registry.osd_new("osd", true)?;
//! registry.element_new("sink", "fakesink")?;
//!
//! registry.pipeline_new("main")?;
//! for name in ["camera", "osd", "sink"] {
//!     registry.pipeline_component_add("main", name)?;
//! }
//! registry.pipeline_link_all("main")?;
//! registry.pipeline_play("main")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bins;
pub mod element;
pub mod engine;
pub mod error;
pub mod graph;
pub mod observability;
pub mod pipeline;
pub mod registry;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bins::{OsdBin, PrimaryGieBin, ReporterBin, RgbaColor, SourceBin, UriSettings};
    pub use crate::element::{Caps, PropertyValue};
    pub use crate::engine::{Engine, MemoryEngine, MemoryEngineConfig, NativeHandle};
    pub use crate::error::{Error, Result};
    pub use crate::graph::{Graph, NodeId, SharedGraph};
    pub use crate::pipeline::{
        ControllerConfig, PipelineController, PipelineEvent, PipelineState, StateChangeListener,
    };
    pub use crate::registry::{Component, Registry};
}

pub use error::{Error, Result};
