//! Layer Registry
//!
//! Owns the ordered collection of layers and a lazily rebuilt identity index.
//!
//! The registry is the only long-term strong owner of a layer. Everything else
//! holds a [`WeakLayer`] or the layer's [`Uuid`] and resolves it on demand, so a
//! removed layer can never be reached through the index.
//!
//! All access goes through one `parking_lot::RwLock`. Readers share the lock;
//! mutations and the index rebuild take it exclusively. A rebuild assembles a
//! fresh map and publishes it with a single assignment, so no reader ever sees
//! a partially built index.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

use super::layer::Layer;
use crate::error::{Result, TrackError};

/// Strong handle to a layer. Only the registry keeps these long-term.
pub type SharedLayer = Arc<RwLock<Layer>>;

/// Non-owning handle to a layer.
pub type WeakLayer = Weak<RwLock<Layer>>;

/// Beat range reported when no layer has any content.
pub const DEFAULT_BEAT_RANGE_END: f32 = 16.0;

type LayerIndex = HashMap<Uuid, WeakLayer>;

#[derive(Debug)]
struct Entry {
    id: Uuid,
    layer: SharedLayer,
}

#[derive(Debug, Default)]
struct RegistryState {
    layers: Vec<Entry>,
    /// `None` while the index is outdated.
    index: Option<Arc<LayerIndex>>,
}

impl RegistryState {
    fn position(&self, id: &Uuid) -> Option<usize> {
        self.layers.iter().position(|e| e.id == *id)
    }

    fn invalidate(&mut self) {
        self.index = None;
    }

    fn rebuild_index_if_needed(&mut self) -> Arc<LayerIndex> {
        if let Some(index) = &self.index {
            return Arc::clone(index);
        }

        let index: LayerIndex = self
            .layers
            .iter()
            .map(|e| (e.id, Arc::downgrade(&e.layer)))
            .collect();
        trace!(entries = index.len(), "rebuilt layer index");

        let index = Arc::new(index);
        self.index = Some(Arc::clone(&index));
        index
    }
}

/// Canonical collection of the project's layers.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    state: RwLock<RegistryState>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer.
    pub fn insert(&self, layer: Layer) -> Result<SharedLayer> {
        self.insert_at(usize::MAX, layer)
    }

    /// Insert a layer at `index`, clamped to the end of the collection.
    ///
    /// Fails with `DuplicateIdentity` and leaves the registry unchanged if a
    /// layer with the same id is already registered.
    pub fn insert_at(&self, index: usize, layer: Layer) -> Result<SharedLayer> {
        let id = layer.id();
        let mut state = self.state.write();

        if state.position(&id).is_some() {
            return Err(TrackError::DuplicateIdentity { id });
        }

        let shared = Arc::new(RwLock::new(layer));
        let at = index.min(state.layers.len());
        state.layers.insert(
            at,
            Entry {
                id,
                layer: Arc::clone(&shared),
            },
        );
        state.invalidate();

        Ok(shared)
    }

    /// Remove a layer and hand ownership back to the caller.
    pub fn remove(&self, id: &Uuid) -> Result<SharedLayer> {
        let mut state = self.state.write();
        let at = state.position(id).ok_or(TrackError::NotFound { id: *id })?;
        let entry = state.layers.remove(at);
        state.invalidate();
        Ok(entry.layer)
    }

    /// Move a layer to position `to`. Returns its previous position.
    pub fn move_layer(&self, id: &Uuid, to: usize) -> Result<usize> {
        let mut state = self.state.write();
        let len = state.layers.len();
        let from = state.position(id).ok_or(TrackError::NotFound { id: *id })?;
        if to >= len {
            return Err(TrackError::IndexOutOfRange { index: to, len });
        }

        if from != to {
            let entry = state.layers.remove(from);
            state.layers.insert(to, entry);
            state.invalidate();
        }

        Ok(from)
    }

    /// Remove every layer, returning them in order.
    pub fn clear(&self) -> Vec<SharedLayer> {
        let mut state = self.state.write();
        state.invalidate();
        state.layers.drain(..).map(|e| e.layer).collect()
    }

    /// Look up a layer by identity.
    ///
    /// Absence is a valid outcome, not an error.
    pub fn find(&self, id: &Uuid) -> Option<WeakLayer> {
        {
            let state = self.state.read();
            if let Some(index) = &state.index {
                return index.get(id).cloned();
            }
        }

        // Another thread may have rebuilt in between; the rebuild re-checks.
        let index = self.state.write().rebuild_index_if_needed();
        index.get(id).cloned()
    }

    /// Look up a layer and upgrade it to a strong handle.
    pub fn get(&self, id: &Uuid) -> Option<SharedLayer> {
        self.find(id).and_then(|weak| weak.upgrade())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.find(id).is_some()
    }

    /// Run `f` against a layer under its write lock.
    pub fn update<R>(&self, id: &Uuid, f: impl FnOnce(&mut Layer) -> R) -> Result<R> {
        let layer = self.get(id).ok_or(TrackError::NotFound { id: *id })?;
        let mut guard = layer.write();
        Ok(f(&mut guard))
    }

    /// Clone the current state of a layer.
    pub fn snapshot(&self, id: &Uuid) -> Result<Layer> {
        let layer = self.get(id).ok_or(TrackError::NotFound { id: *id })?;
        let snapshot = layer.read().clone();
        Ok(snapshot)
    }

    pub fn position(&self, id: &Uuid) -> Option<usize> {
        self.state.read().position(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().layers.is_empty()
    }

    /// Layer ids in registry order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.state.read().layers.iter().map(|e| e.id).collect()
    }

    /// Layer at a position in registry order.
    pub fn layer_at(&self, index: usize) -> Result<SharedLayer> {
        let state = self.state.read();
        state
            .layers
            .get(index)
            .map(|e| Arc::clone(&e.layer))
            .ok_or(TrackError::IndexOutOfRange {
                index,
                len: state.layers.len(),
            })
    }

    /// Snapshot of the live layers in order, optionally only the selected ones.
    ///
    /// The returned handles stay valid if the registry is mutated afterwards.
    pub fn all_layers(&self, only_selected: bool) -> Vec<SharedLayer> {
        let layers: Vec<SharedLayer> = {
            let state = self.state.read();
            state.layers.iter().map(|e| Arc::clone(&e.layer)).collect()
        };

        if only_selected {
            layers
                .into_iter()
                .filter(|layer| layer.read().is_selected())
                .collect()
        } else {
            layers
        }
    }

    /// Aggregate beat range across all layers, computed from current state.
    pub fn beat_range(&self) -> (f32, f32) {
        self.all_layers(false)
            .iter()
            .filter_map(|layer| layer.read().beat_range())
            .reduce(|(s1, e1), (s2, e2)| (s1.min(s2), e1.max(e2)))
            .unwrap_or((0.0, DEFAULT_BEAT_RANGE_END))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{LayerKind, NoteEvent};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn piano(name: &str) -> Layer {
        Layer::new(LayerKind::Piano, name)
    }

    #[test]
    fn test_insert_and_find() {
        let registry = LayerRegistry::new();
        let layer = piano("Lead");
        let id = layer.id();

        registry.insert(layer).unwrap();

        let found = registry.find(&id).and_then(|w| w.upgrade()).unwrap();
        assert_eq!(found.read().name(), "Lead");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_identity_leaves_state_unchanged() {
        let registry = LayerRegistry::new();
        let layer = piano("Lead");
        let id = layer.id();
        registry.insert(layer).unwrap();

        let err = registry
            .insert(Layer::with_id(id, LayerKind::Automation, "Other"))
            .unwrap_err();
        assert!(matches!(err, TrackError::DuplicateIdentity { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(&id).unwrap().name(), "Lead");
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let registry = LayerRegistry::new();
        registry.insert(piano("Lead")).unwrap();

        let err = registry.remove(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, TrackError::NotFound { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_after_remove_returns_none() {
        let registry = LayerRegistry::new();
        let layer = piano("Lead");
        let id = layer.id();
        registry.insert(layer).unwrap();

        // Populate the index before the removal
        let weak = registry.find(&id).unwrap();

        let removed = registry.remove(&id).unwrap();
        assert!(registry.find(&id).is_none());

        drop(removed);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_find_absent_is_none() {
        let registry = LayerRegistry::new();
        assert!(registry.find(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_insert_at_and_move() {
        let registry = LayerRegistry::new();
        let a = piano("A");
        let b = piano("B");
        let c = piano("C");
        let (ida, idb, idc) = (a.id(), b.id(), c.id());

        registry.insert(a).unwrap();
        registry.insert(c).unwrap();
        registry.insert_at(1, b).unwrap();
        assert_eq!(registry.ids(), vec![ida, idb, idc]);

        let from = registry.move_layer(&ida, 2).unwrap();
        assert_eq!(from, 0);
        assert_eq!(registry.ids(), vec![idb, idc, ida]);
        assert_eq!(registry.position(&ida), Some(2));

        let err = registry.move_layer(&ida, 3).unwrap_err();
        assert!(matches!(err, TrackError::IndexOutOfRange { index: 3, len: 3 }));
    }

    #[test]
    fn test_all_layers_selected_filter() {
        let registry = LayerRegistry::new();
        let mut a = piano("A");
        a.set_selected(true);
        registry.insert(a).unwrap();
        registry.insert(piano("B")).unwrap();

        assert_eq!(registry.all_layers(false).len(), 2);
        let selected = registry.all_layers(true);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].read().name(), "A");
    }

    #[test]
    fn test_all_layers_is_a_snapshot() {
        let registry = LayerRegistry::new();
        let layer = piano("A");
        let id = layer.id();
        registry.insert(layer).unwrap();

        let snapshot = registry.all_layers(false);
        registry.remove(&id).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_and_beat_range() {
        let registry = LayerRegistry::new();
        assert_eq!(registry.beat_range(), (0.0, DEFAULT_BEAT_RANGE_END));

        let a = piano("A");
        let b = piano("B");
        let (ida, idb) = (a.id(), b.id());
        registry.insert(a).unwrap();
        registry.insert(b).unwrap();

        registry
            .update(&ida, |l| l.add_event(NoteEvent::new(60, 4.0, 4.0, 0.8)))
            .unwrap();
        registry
            .update(&idb, |l| l.add_event(NoteEvent::new(60, 1.0, 2.0, 0.8)))
            .unwrap();

        let (start, end) = registry.beat_range();
        assert_relative_eq!(start, 1.0);
        assert_relative_eq!(end, 8.0);

        registry.remove(&ida).unwrap();
        let (_, end) = registry.beat_range();
        assert_relative_eq!(end, 3.0);
    }

    #[test]
    fn test_update_missing_layer() {
        let registry = LayerRegistry::new();
        let err = registry.update(&Uuid::new_v4(), |_| ()).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_layer_at() {
        let registry = LayerRegistry::new();
        registry.insert(piano("A")).unwrap();
        assert_eq!(registry.layer_at(0).unwrap().read().name(), "A");
        assert!(matches!(
            registry.layer_at(1),
            Err(TrackError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_clear() {
        let registry = LayerRegistry::new();
        let layer = piano("A");
        let id = layer.id();
        registry.insert(layer).unwrap();
        registry.insert(piano("B")).unwrap();

        let removed = registry.clear();
        assert_eq!(removed.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.find(&id).is_none());
    }
}
