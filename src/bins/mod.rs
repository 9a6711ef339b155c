//! Ready-made bins.
//!
//! Each bin here builds a fixed chain of catalog elements inside a new
//! [`Graph`] bin, exposes a "sink" ghost pad on the first element (when it
//! has one) and a "src" ghost pad on the last, and keeps configuration state
//! that it writes through to the child elements' attributes. The chain is
//! left unlinked; linking the bin (or the pipeline it joins) connects it.

mod gie;
mod osd;
mod reporter;
mod source;

pub use gie::PrimaryGieBin;
pub use osd::{ClockSettings, CropRect, DetectedObject, OsdBin};
pub use reporter::ReporterBin;
pub use source::{SourceBin, SourceKind, UriSettings};

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};

/// RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbaColor {
    /// Red.
    pub red: f64,
    /// Green.
    pub green: f64,
    /// Blue.
    pub blue: f64,
    /// Alpha.
    pub alpha: f64,
}

impl RgbaColor {
    /// Create a color, rejecting components outside `[0, 1]`.
    pub fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Result<Self> {
        for (label, c) in [("red", red), ("green", green), ("blue", blue), ("alpha", alpha)] {
            if !(0.0..=1.0).contains(&c) {
                return Err(Error::InvalidValue(format!(
                    "{label} component {c} is outside [0, 1]"
                )));
            }
        }
        Ok(Self {
            red,
            green,
            blue,
            alpha,
        })
    }

    /// Opaque white.
    pub const fn white() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            alpha: 1.0,
        }
    }

    /// Pack into `0xRRGGBBAA`.
    pub fn to_rgba_u32(&self) -> u32 {
        let byte = |c: f64| (c * 255.0).round() as u32;
        (byte(self.red) << 24) | (byte(self.green) << 16) | (byte(self.blue) << 8) | byte(self.alpha)
    }
}

/// Builds a bin from a chain of factories, undoing everything on failure.
pub(crate) struct ChainBuilder<'g> {
    graph: &'g mut Graph,
    bin: Option<NodeId>,
    name: String,
    members: Vec<NodeId>,
}

impl<'g> ChainBuilder<'g> {
    pub(crate) fn new(graph: &'g mut Graph, name: &str) -> Result<Self> {
        let bin = graph.new_bin(name)?;
        Ok(Self {
            graph,
            bin: Some(bin),
            name: name.to_string(),
            members: Vec::new(),
        })
    }

    /// Create `factory` as a child named `<bin>-<suffix>`.
    pub(crate) fn element(&mut self, factory: &str, suffix: &str) -> Result<NodeId> {
        let child_name = format!("{}-{suffix}", self.name);
        let bin = self.bin.ok_or(Error::NodeNotFound)?;
        let id = self.graph.new_element(factory, &child_name)?;
        if let Err(e) = self.graph.add_child(bin, id) {
            let _ = self.graph.destroy(id);
            return Err(e);
        }
        self.members.push(id);
        Ok(id)
    }

    fn ghost_boundaries(&mut self) -> Result<()> {
        let engine = self.graph.engine().clone();
        if let Some(&first) = self.members.first()
            && let Some(handle) = self.graph.handle(first)
            && engine.has_pad(handle, "sink")
        {
            self.graph.add_ghost_pad_to_parent(first, "sink")?;
        }
        if let Some(&last) = self.members.last() {
            self.graph.add_ghost_pad_to_parent(last, "src")?;
        }
        Ok(())
    }

    /// Expose the boundary pads and hand back the bin.
    pub(crate) fn finish(mut self) -> Result<NodeId> {
        self.ghost_boundaries()?;
        tracing::debug!(bin = %self.name, children = self.members.len(), "bin built");
        self.bin.take().ok_or(Error::NodeNotFound)
    }

    pub(crate) fn graph(&mut self) -> &mut Graph {
        self.graph
    }
}

impl Drop for ChainBuilder<'_> {
    fn drop(&mut self) {
        if let Some(bin) = self.bin.take() {
            tracing::debug!(bin = %self.name, "discarding partially built bin");
            let _ = self.graph.destroy(bin);
        }
    }
}
