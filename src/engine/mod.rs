//! Native processing engine seam.
//!
//! The graph never touches media itself. It creates, configures, groups and
//! links opaque native objects through the [`Engine`] trait, addressing them
//! by [`NativeHandle`]. A real deployment backs this trait with a media
//! framework; [`MemoryEngine`] is the in-process implementation used for
//! dry runs and tests.

mod factory;
mod memory;

pub use factory::{ElementSpec, FactoryCatalog};
pub use memory::{MemoryEngine, MemoryEngineConfig};

use crate::element::{PadDirection, PropertyValue};
use crate::error::Result;
use crate::pipeline::{Bus, PipelineState, StateChangeReturn};
use std::fmt;
use std::time::Duration;

/// Opaque identity of a native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Wrap a raw engine identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operations the graph core requires from a processing engine.
///
/// Every handle returned by a `create_*` call is owned by exactly one graph
/// node and handed back through [`Engine::release`] when that node goes away.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Instantiate an element from a named factory.
    fn create_element(&self, factory: &str, name: &str) -> Result<NativeHandle>;

    /// Instantiate an empty container.
    fn create_bin(&self, name: &str) -> Result<NativeHandle>;

    /// Instantiate a top-level pipeline container.
    fn create_pipeline(&self, name: &str) -> Result<NativeHandle>;

    /// Release a native object. Unknown handles are ignored.
    fn release(&self, handle: NativeHandle);

    /// Set a named attribute.
    fn set_property(&self, handle: NativeHandle, name: &str, value: &PropertyValue) -> Result<()>;

    /// Read back a named attribute, if it has been set.
    fn property(&self, handle: NativeHandle, name: &str) -> Option<PropertyValue>;

    /// Check whether the object has a pad with this name (static or ghost).
    fn has_pad(&self, handle: NativeHandle, pad: &str) -> bool;

    /// Name of the pad a link in `direction` would use.
    fn first_pad(&self, handle: NativeHandle, direction: PadDirection) -> Option<String>;

    /// Add `child` to the native container `bin`.
    fn bin_add(&self, bin: NativeHandle, child: NativeHandle) -> Result<()>;

    /// Remove `child` from the native container `bin`.
    fn bin_remove(&self, bin: NativeHandle, child: NativeHandle) -> Result<()>;

    /// Expose `target`'s static pad `pad` as a ghost pad of the same name on
    /// `bin`.
    fn add_ghost_pad(&self, bin: NativeHandle, target: NativeHandle, pad: &str) -> Result<()>;

    /// Remove the ghost pad `pad` from `bin`.
    fn remove_ghost_pad(&self, bin: NativeHandle, pad: &str) -> Result<()>;

    /// Connect `src`'s output to `sink`'s input.
    fn link(&self, src: NativeHandle, sink: NativeHandle) -> Result<()>;

    /// Disconnect a previous [`Engine::link`]. Unlinked pairs are ignored.
    fn unlink(&self, src: NativeHandle, sink: NativeHandle);

    /// Request a state transition.
    fn set_state(&self, handle: NativeHandle, state: PipelineState) -> StateChangeReturn;

    /// Wait up to `timeout` for a pending transition and report the state.
    fn wait_state(&self, handle: NativeHandle, timeout: Duration) -> (StateChangeReturn, PipelineState);

    /// Route messages posted by `pipeline` and its descendants to `bus`.
    fn attach_bus(&self, pipeline: NativeHandle, bus: Bus);

    /// Stop routing messages from `pipeline`.
    fn detach_bus(&self, pipeline: NativeHandle);
}
