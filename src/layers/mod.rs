//! Layer Model Module
//!
//! Implements the editable content of a project:
//! - Layer: one identified track of note events
//! - LayerRegistry: the owning collection with a lazy identity index

mod layer;
mod registry;

pub use layer::{Layer, LayerKind, NoteEvent};
pub use registry::{LayerRegistry, SharedLayer, WeakLayer, DEFAULT_BEAT_RANGE_END};
