//! Project
//!
//! The composition root of a document. A project owns the layer registry, the
//! undo history, the change notifier and the project info, and is the only
//! path through which they are mutated.
//!
//! Every user-facing mutation is expressed as an [`UndoRecord`], performed
//! through the history, and broadcast to listeners once it has been applied
//! and recorded. Changes that arrive through the version-control seam bypass
//! the history and clear it, since the records reference layers the engine
//! may have replaced.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, TrackError};
use crate::layers::{Layer, LayerKind, LayerRegistry, NoteEvent, SharedLayer, WeakLayer};
use crate::state::info::ProjectInfo;
use crate::state::migration::{migrate_document, CURRENT_SCHEMA_VERSION};
use crate::state::notifier::{ChangeEvent, ChangeListener, ChangeNotifier, ListenerId};
use crate::state::storage::{DocumentStore, ProjectDocument};
use crate::state::undo::{LayerEdit, UndoContext, UndoHistory, UndoOutcome, UndoRecord};
use crate::vcs::{TrackedItem, TrackedItemSource, TrackedType};

/// A music project document.
#[derive(Debug)]
pub struct Project {
    /// Display name, also the name shown by the VCS engine.
    name: String,

    /// Owning collection of layers, shared with reader threads.
    registry: Arc<LayerRegistry>,

    /// Project-level metadata.
    info: ProjectInfo,

    undo: UndoHistory,

    notifier: ChangeNotifier,

    /// Where the project was last loaded from or saved to.
    document_path: Option<PathBuf>,

    /// Whether there are changes since the last save or load.
    dirty: bool,
}

impl Project {
    /// Create an empty project.
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        let name = name.into();
        Self {
            info: ProjectInfo::new(name.clone()),
            name,
            registry: Arc::new(LayerRegistry::new()),
            undo: UndoHistory::new(config.undo.max_levels),
            notifier: ChangeNotifier::new(),
            document_path: None,
            dirty: false,
        }
    }

    /// Load a project from a document store.
    pub fn open(store: &dyn DocumentStore, path: &Path, config: &Config) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled");
        let mut project = Self::new(name, config);
        project.load_from(store, path)?;
        Ok(project)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the project. Not recorded in the undo history.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.dirty = true;
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.document_path.as_deref()
    }

    pub(crate) fn set_document_path(&mut self, path: PathBuf) {
        self.document_path = Some(path);
    }

    /// Shared handle to the registry for read access from other threads.
    pub fn registry(&self) -> Arc<LayerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn undo_history(&self) -> &UndoHistory {
        &self.undo
    }

    pub fn layer(&self, id: &Uuid) -> Option<SharedLayer> {
        self.registry.get(id)
    }

    pub fn find_layer(&self, id: &Uuid) -> Option<WeakLayer> {
        self.registry.find(id)
    }

    pub fn layers(&self) -> Vec<SharedLayer> {
        self.registry.all_layers(false)
    }

    pub fn selected_layers(&self) -> Vec<SharedLayer> {
        self.registry.all_layers(true)
    }

    pub fn layer_ids(&self) -> Vec<Uuid> {
        self.registry.ids()
    }

    pub fn beat_range(&self) -> (f32, f32) {
        self.registry.beat_range()
    }

    /// Short human-readable summary.
    pub fn stats(&self) -> String {
        let layers = self.registry.all_layers(false);
        let events: usize = layers.iter().map(|l| l.read().events().len()).sum();
        format!("{} layers, {} events", layers.len(), events)
    }

    // ========================================================================
    // Layer operations
    // ========================================================================

    /// Create an empty layer at the end of the project.
    pub fn add_layer(&mut self, kind: LayerKind, name: impl Into<String>) -> Result<Uuid> {
        self.insert_layer(Layer::new(kind, name))
    }

    /// Append a prepared layer.
    pub fn insert_layer(&mut self, layer: Layer) -> Result<Uuid> {
        let id = layer.id();
        let index = self.registry.len();
        self.perform(UndoRecord::InsertLayer {
            index,
            snapshot: layer,
        })?;
        Ok(id)
    }

    pub fn remove_layer(&mut self, id: &Uuid) -> Result<()> {
        let index = self
            .registry
            .position(id)
            .ok_or(TrackError::NotFound { id: *id })?;
        let snapshot = self.registry.snapshot(id)?;
        self.perform(UndoRecord::RemoveLayer { index, snapshot })
    }

    pub fn move_layer(&mut self, id: &Uuid, to: usize) -> Result<()> {
        let from = self
            .registry
            .position(id)
            .ok_or(TrackError::NotFound { id: *id })?;
        let len = self.registry.len();
        if to >= len {
            return Err(TrackError::IndexOutOfRange { index: to, len });
        }
        if from == to {
            return Ok(());
        }
        self.perform(UndoRecord::MoveLayer { id: *id, from, to })
    }

    pub fn rename_layer(&mut self, id: &Uuid, name: impl Into<String>) -> Result<()> {
        let old = self.registry.snapshot(id)?.name().to_string();
        self.perform(UndoRecord::EditLayer {
            id: *id,
            edit: LayerEdit::Rename {
                old,
                new: name.into(),
            },
        })
    }

    pub fn set_layer_muted(&mut self, id: &Uuid, muted: bool) -> Result<()> {
        let old = self.registry.snapshot(id)?.is_muted();
        self.perform(UndoRecord::EditLayer {
            id: *id,
            edit: LayerEdit::SetMuted { old, new: muted },
        })
    }

    /// Change the selection. Selection is view state: not undoable, not a
    /// document change.
    pub fn set_layer_selected(&mut self, id: &Uuid, selected: bool) -> Result<()> {
        self.registry.update(id, |layer| layer.set_selected(selected))?;
        self.notifier
            .broadcast(&ChangeEvent::LayerChanged { layer: *id });
        Ok(())
    }

    pub fn add_event(&mut self, layer: &Uuid, event: NoteEvent) -> Result<Uuid> {
        let event_id = event.id;
        self.perform(UndoRecord::EditLayer {
            id: *layer,
            edit: LayerEdit::AddEvent { event },
        })?;
        Ok(event_id)
    }

    pub fn remove_event(&mut self, layer: &Uuid, event_id: &Uuid) -> Result<()> {
        let event = self.existing_event(layer, event_id)?;
        self.perform(UndoRecord::EditLayer {
            id: *layer,
            edit: LayerEdit::RemoveEvent { event },
        })
    }

    /// Replace an event's content, keeping its id.
    pub fn change_event(
        &mut self,
        layer: &Uuid,
        event_id: &Uuid,
        mut new_event: NoteEvent,
    ) -> Result<()> {
        let old = self.existing_event(layer, event_id)?;
        new_event.id = old.id;
        self.perform(UndoRecord::EditLayer {
            id: *layer,
            edit: LayerEdit::ChangeEvent { old, new: new_event },
        })
    }

    fn existing_event(&self, layer: &Uuid, event_id: &Uuid) -> Result<NoteEvent> {
        self.registry
            .snapshot(layer)?
            .event(event_id)
            .copied()
            .ok_or(TrackError::NotFound { id: *event_id })
    }

    /// Edit the project info. The identity cannot be changed this way.
    pub fn update_info(&mut self, f: impl FnOnce(&mut ProjectInfo)) -> Result<()> {
        let before = self.info.clone();
        let mut after = before.clone();
        f(&mut after);
        after.id = before.id;
        if after == before {
            return Ok(());
        }
        self.perform(UndoRecord::ChangeInfo { before, after })
    }

    fn perform(&mut self, record: UndoRecord) -> Result<()> {
        let range_before = self.registry.beat_range();
        let events = {
            let mut ctx = UndoContext {
                layers: &self.registry,
                info: &mut self.info,
            };
            self.undo.perform(record, &mut ctx)?
        };
        self.dirty = true;
        self.broadcast(&events, range_before);
        Ok(())
    }

    /// Broadcast after the mutation and its record are complete.
    fn broadcast(&self, events: &[ChangeEvent], range_before: (f32, f32)) {
        self.notifier.broadcast_all(events);

        let (start, end) = self.registry.beat_range();
        if (start, end) != range_before {
            self.notifier
                .broadcast(&ChangeEvent::BeatRangeChanged { start, end });
        }
    }

    // ========================================================================
    // Undo
    // ========================================================================

    pub fn checkpoint(&mut self) {
        self.undo.checkpoint();
    }

    pub fn checkpoint_named(&mut self, label: impl Into<String>) {
        self.undo.checkpoint_named(label);
    }

    pub fn undo(&mut self) -> Result<UndoOutcome> {
        let range_before = self.registry.beat_range();
        let outcome = {
            let mut ctx = UndoContext {
                layers: &self.registry,
                info: &mut self.info,
            };
            self.undo.undo(&mut ctx)?
        };
        if let UndoOutcome::Applied { events, .. } = &outcome {
            self.dirty = true;
            self.broadcast(events, range_before);
        }
        Ok(outcome)
    }

    pub fn redo(&mut self) -> Result<UndoOutcome> {
        let range_before = self.registry.beat_range();
        let outcome = {
            let mut ctx = UndoContext {
                layers: &self.registry,
                info: &mut self.info,
            };
            self.undo.redo(&mut ctx)?
        };
        if let UndoOutcome::Applied { events, .. } = &outcome {
            self.dirty = true;
            self.broadcast(events, range_before);
        }
        Ok(outcome)
    }

    pub fn clear_undo_history(&mut self) {
        self.undo.clear();
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.notifier.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    pub fn remove_all_listeners(&self) {
        self.notifier.remove_all_listeners();
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize the whole project into a document tree.
    pub fn serialize(&self) -> Result<Value> {
        let layers = self
            .registry
            .all_layers(false)
            .iter()
            .map(|layer| TrackedItem::from_layer(&layer.read()))
            .collect::<Result<Vec<_>>>()?;

        let document = ProjectDocument {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            name: self.name.clone(),
            info: TrackedItem::from_info(&self.info)?,
            layers,
            unknown_fields: HashMap::new(),
        };
        Ok(serde_json::to_value(document)?)
    }

    /// Replace the project content with a document tree.
    ///
    /// The document is migrated and fully validated before anything is
    /// touched; on error the project is unchanged. On success the undo
    /// history is cleared.
    pub fn deserialize(&mut self, raw: Value) -> Result<()> {
        let document: ProjectDocument = serde_json::from_value(migrate_document(raw)?)?;
        let info = document.info.to_info()?;

        let mut seen = HashSet::new();
        let layers = document
            .layers
            .iter()
            .map(|block| {
                let layer = block.to_layer()?;
                if !seen.insert(layer.id()) {
                    return Err(TrackError::DuplicateIdentity { id: layer.id() });
                }
                Ok(layer)
            })
            .collect::<Result<Vec<Layer>>>()?;

        let range_before = self.registry.beat_range();
        let mut events = self.clear_layers();
        for layer in layers {
            events.push(ChangeEvent::LayerAdded {
                layer: layer.id(),
                kind: layer.kind(),
            });
            self.registry.insert(layer)?;
        }

        self.name = document.name;
        self.info = info;
        events.push(ChangeEvent::InfoChanged(self.info.clone()));

        self.undo.clear();
        self.dirty = false;
        debug!(project = %self.name, layers = self.registry.len(), "deserialized project");

        self.broadcast(&events, range_before);
        Ok(())
    }

    /// Drop all content and history, keeping the name.
    pub fn reset(&mut self) {
        let range_before = self.registry.beat_range();
        let mut events = self.clear_layers();
        self.info = ProjectInfo::new(self.name.clone());
        events.push(ChangeEvent::InfoChanged(self.info.clone()));
        self.undo.clear();
        self.dirty = false;
        self.broadcast(&events, range_before);
    }

    fn clear_layers(&mut self) -> Vec<ChangeEvent> {
        self.registry
            .clear()
            .iter()
            .map(|layer| {
                let layer = layer.read();
                ChangeEvent::LayerRemoved {
                    layer: layer.id(),
                    kind: layer.kind(),
                }
            })
            .collect()
    }

    // ========================================================================
    // Document lifecycle
    // ========================================================================

    /// Write the project through a store. Clears the dirty flag on success.
    pub fn save_to(&mut self, store: &dyn DocumentStore, path: &Path) -> Result<bool> {
        self.info.touch();
        let state = self.serialize()?;
        let saved = store.save(path, &state)?;
        if saved {
            self.dirty = false;
            self.document_path = Some(path.to_path_buf());
        }
        Ok(saved)
    }

    /// Save to the path the project was loaded from or last saved to.
    pub fn save(&mut self, store: &dyn DocumentStore) -> Result<bool> {
        let path = self
            .document_path
            .clone()
            .ok_or_else(|| TrackError::Internal("project has no document path".to_string()))?;
        self.save_to(store, &path)
    }

    /// Replace the project with a stored document. Clears the undo history.
    pub fn load_from(&mut self, store: &dyn DocumentStore, path: &Path) -> Result<()> {
        let raw = store.load(path)?;
        self.deserialize(raw)?;
        self.document_path = Some(path.to_path_buf());
        Ok(())
    }

    // ========================================================================
    // Version control
    // ========================================================================

    fn after_vcs_change(&mut self, events: &[ChangeEvent], range_before: (f32, f32)) {
        self.undo.clear();
        self.dirty = true;
        self.broadcast(events, range_before);
    }
}

impl TrackedItemSource for Project {
    fn vcs_name(&self) -> String {
        self.name.clone()
    }

    fn num_tracked_items(&self) -> usize {
        self.registry.len() + 1
    }

    fn tracked_item(&self, index: usize) -> Result<TrackedItem> {
        if index == 0 {
            return TrackedItem::from_info(&self.info);
        }

        match self.registry.layer_at(index - 1) {
            Ok(layer) => TrackedItem::from_layer(&layer.read()),
            Err(_) => Err(TrackError::IndexOutOfRange {
                index,
                len: self.num_tracked_items(),
            }),
        }
    }

    fn init_tracked_item(&mut self, type_tag: &str, id: Uuid) -> Result<TrackedItem> {
        let tracked = TrackedType::from_tag(type_tag).ok_or_else(|| TrackError::UnsupportedType {
            type_tag: type_tag.to_string(),
        })?;
        let range_before = self.registry.beat_range();

        let (item, event) = match tracked.layer_kind() {
            None => {
                self.info.id = id;
                (
                    TrackedItem::from_info(&self.info)?,
                    ChangeEvent::InfoChanged(self.info.clone()),
                )
            }
            Some(kind) => {
                let shared = self
                    .registry
                    .insert(Layer::with_id(id, kind, kind.to_string()))?;
                let item = TrackedItem::from_layer(&shared.read())?;
                (item, ChangeEvent::LayerAdded { layer: id, kind })
            }
        };

        debug!(%id, type_tag, "initialized tracked item");
        self.after_vcs_change(&[event], range_before);
        Ok(item)
    }

    fn delete_tracked_item(&mut self, item: &TrackedItem) -> bool {
        // Project info is part of every project and cannot be deleted.
        if item.type_tag.layer_kind().is_none() {
            return false;
        }

        let range_before = self.registry.beat_range();
        match self.registry.remove(&item.id) {
            Ok(layer) => {
                let kind = layer.read().kind();
                self.after_vcs_change(
                    &[ChangeEvent::LayerRemoved {
                        layer: item.id,
                        kind,
                    }],
                    range_before,
                );
                true
            }
            Err(_) => false,
        }
    }

    fn reset_tracked_item_state(&mut self, item: &TrackedItem) -> Result<()> {
        let range_before = self.registry.beat_range();

        let event = match item.type_tag.layer_kind() {
            None => {
                let info = item.to_info()?;
                if info.id != self.info.id {
                    return Err(TrackError::NotFound { id: info.id });
                }
                self.info = info;
                ChangeEvent::InfoChanged(self.info.clone())
            }
            Some(_) => {
                let snapshot = item.to_layer()?;
                self.registry
                    .update(&item.id, |layer| layer.restore_from(&snapshot))?;
                ChangeEvent::LayerChanged { layer: item.id }
            }
        };

        self.after_vcs_change(&[event], range_before);
        Ok(())
    }
}
