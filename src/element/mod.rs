//! Element-level building blocks shared by the graph and the engine.
//!
//! - [`PropertyValue`] / [`PropertySpec`]: attribute values and the closed
//!   per-factory schemas they are checked against
//! - [`Caps`]: capability descriptors carried as attribute values
//! - [`Pad`] / [`PadTemplate`]: static and ghost ports of native objects

mod caps;
mod pad;
mod property;

pub use caps::{Caps, CapsField};
pub use pad::{Pad, PadDirection, PadList, PadPresence, PadTemplate};
pub use property::{PropertyKind, PropertySpec, PropertyValue, check_property};
