//! Version Control Seam
//!
//! The VCS engine sees a project only as an ordered collection of tracked
//! items. Each item is a self-describing block (type tag, identity, state)
//! that can be enumerated, deleted, and reconstructed through
//! [`TrackedItemSource::init_tracked_item`].

mod tracked;

pub use tracked::{TrackedItem, TrackedType};

use uuid::Uuid;

use crate::error::Result;

/// Capability exposed to the version-control engine.
///
/// Enumeration order is stable while no mutation happens. The engine never
/// reaches past this trait into the layer registry.
pub trait TrackedItemSource {
    /// Name under which the engine shows this source.
    fn vcs_name(&self) -> String;

    /// Number of trackable items.
    fn num_tracked_items(&self) -> usize;

    /// Item at a position; `IndexOutOfRange` past the end.
    fn tracked_item(&self, index: usize) -> Result<TrackedItem>;

    /// Create an empty item of the given type with the given identity.
    ///
    /// Fails with `UnsupportedType` for unknown tags.
    fn init_tracked_item(&mut self, type_tag: &str, id: Uuid) -> Result<TrackedItem>;

    /// Delete an item. Returns false if it does not exist.
    fn delete_tracked_item(&mut self, item: &TrackedItem) -> bool;

    /// Overwrite the state of an existing item from a serialized block.
    fn reset_tracked_item_state(&mut self, item: &TrackedItem) -> Result<()>;

    /// All items in enumeration order.
    fn tracked_items(&self) -> Result<Vec<TrackedItem>> {
        (0..self.num_tracked_items())
            .map(|i| self.tracked_item(i))
            .collect()
    }
}
