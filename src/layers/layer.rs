//! Layer Entity
//!
//! A layer is one editable track of the project: a uniquely identified,
//! ordered container of note events.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of layers a project can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Piano roll track.
    Piano,
    /// Controller automation track.
    Automation,
    /// Text annotations on the timeline.
    Annotations,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Piano => write!(f, "Piano"),
            LayerKind::Automation => write!(f, "Automation"),
            LayerKind::Annotations => write!(f, "Annotations"),
        }
    }
}

/// A single event inside a layer.
///
/// For automation layers `key` is the controller number and `velocity` the
/// controller value; annotations ignore both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Unique identifier of the event within its layer.
    pub id: Uuid,
    /// MIDI key or controller number.
    pub key: i32,
    /// Start position in beats.
    pub beat: f32,
    /// Length in beats.
    pub length: f32,
    /// Normalized velocity (0.0 - 1.0).
    pub velocity: f32,
}

impl NoteEvent {
    /// Create a new event with a generated id.
    pub fn new(key: i32, beat: f32, length: f32, velocity: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            beat,
            length: length.max(0.0),
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    /// Beat at which the event ends.
    pub fn end_beat(&self) -> f32 {
        self.beat + self.length
    }
}

/// An editable track.
///
/// The identity is fixed at construction. Every change to the content or
/// attributes bumps `mutation_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    id: Uuid,
    name: String,
    kind: LayerKind,
    #[serde(default)]
    channel: u8,
    #[serde(default)]
    selected: bool,
    #[serde(default)]
    muted: bool,
    #[serde(default)]
    events: Vec<NoteEvent>,
    #[serde(default, skip_serializing)]
    mutation_count: u64,
}

impl Layer {
    /// Create an empty layer with a generated identity.
    pub fn new(kind: LayerKind, name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, name)
    }

    /// Create an empty layer with a given identity (document load, VCS reconstruct).
    pub fn with_id(id: Uuid, kind: LayerKind, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            channel: 0,
            selected: false,
            muted: false,
            events: Vec::new(),
            mutation_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Events ordered by start beat.
    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn event(&self, id: &Uuid) -> Option<&NoteEvent> {
        self.events.iter().find(|e| e.id == *id)
    }

    /// Number of changes applied since construction.
    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel.min(15);
        self.touch();
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
        self.touch();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.touch();
    }

    /// Insert an event, keeping events ordered by beat.
    ///
    /// Returns false if an event with the same id is already present.
    pub fn add_event(&mut self, event: NoteEvent) -> bool {
        if self.event(&event.id).is_some() {
            return false;
        }
        let at = self.events.partition_point(|e| e.beat <= event.beat);
        self.events.insert(at, event);
        self.touch();
        true
    }

    /// Remove an event by id.
    pub fn remove_event(&mut self, id: &Uuid) -> Option<NoteEvent> {
        let at = self.events.iter().position(|e| e.id == *id)?;
        let removed = self.events.remove(at);
        self.touch();
        Some(removed)
    }

    /// Replace an event in place, keeping its id. Returns the old event.
    pub fn change_event(&mut self, id: &Uuid, mut new_event: NoteEvent) -> Option<NoteEvent> {
        let old = self.remove_event(id)?;
        new_event.id = old.id;
        self.add_event(new_event);
        Some(old)
    }

    /// Restore the event invariants after the layer was read from outside.
    ///
    /// Events are stably sorted by beat. Returns the first repeated event id,
    /// if any; the layer is left untouched in that case.
    pub fn normalize_events(&mut self) -> Result<(), Uuid> {
        let mut seen = HashSet::with_capacity(self.events.len());
        if let Some(dup) = self.events.iter().find(|e| !seen.insert(e.id)) {
            return Err(dup.id);
        }
        self.events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        Ok(())
    }

    /// First and last beat covered by the events, `None` when empty.
    pub fn beat_range(&self) -> Option<(f32, f32)> {
        let first = self.events.first()?;
        let start = first.beat;
        let end = self
            .events
            .iter()
            .map(NoteEvent::end_beat)
            .fold(first.end_beat(), f32::max);
        Some((start, end))
    }

    /// Copy name, attributes and events from a snapshot of the same layer.
    ///
    /// The identity is kept and the mutation counter moves forward, so change
    /// detection still sees the restore as a change.
    pub fn restore_from(&mut self, snapshot: &Layer) {
        self.name = snapshot.name.clone();
        self.kind = snapshot.kind;
        self.channel = snapshot.channel;
        self.selected = snapshot.selected;
        self.muted = snapshot.muted;
        self.events = snapshot.events.clone();
        self.touch();
    }

    fn touch(&mut self) {
        self.mutation_count = self.mutation_count.wrapping_add(1);
    }
}

// The mutation counter is bookkeeping, not content.
impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.kind == other.kind
            && self.channel == other.channel
            && self.selected == other.selected
            && self.muted == other.muted
            && self.events == other.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_events_stay_ordered() {
        let mut layer = Layer::new(LayerKind::Piano, "Lead");
        layer.add_event(NoteEvent::new(60, 4.0, 1.0, 0.8));
        layer.add_event(NoteEvent::new(62, 0.0, 1.0, 0.8));
        layer.add_event(NoteEvent::new(64, 2.0, 0.5, 0.8));

        let beats: Vec<f32> = layer.events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_duplicate_event_rejected() {
        let mut layer = Layer::new(LayerKind::Piano, "Lead");
        let event = NoteEvent::new(60, 0.0, 1.0, 0.8);
        assert!(layer.add_event(event));
        assert!(!layer.add_event(event));
        assert_eq!(layer.events().len(), 1);
    }

    #[test]
    fn test_mutation_count_tracks_changes() {
        let mut layer = Layer::new(LayerKind::Piano, "Lead");
        assert_eq!(layer.mutation_count(), 0);

        let event = NoteEvent::new(60, 0.0, 1.0, 0.8);
        layer.add_event(event);
        layer.set_name("Bass");
        assert_eq!(layer.mutation_count(), 2);

        // Removing an unknown event is not a change
        assert!(layer.remove_event(&Uuid::new_v4()).is_none());
        assert_eq!(layer.mutation_count(), 2);
    }

    #[test]
    fn test_change_event_keeps_id() {
        let mut layer = Layer::new(LayerKind::Piano, "Lead");
        let event = NoteEvent::new(60, 0.0, 1.0, 0.8);
        layer.add_event(event);

        let old = layer
            .change_event(&event.id, NoteEvent::new(67, 8.0, 2.0, 0.5))
            .unwrap();
        assert_eq!(old, event);

        let changed = layer.event(&event.id).unwrap();
        assert_eq!(changed.key, 67);
        assert_relative_eq!(changed.beat, 8.0);
    }

    #[test]
    fn test_normalize_events_sorts_by_beat() {
        let late = NoteEvent::new(64, 8.0, 1.0, 0.8);
        let early = NoteEvent::new(60, 2.0, 1.0, 0.8);
        let mut json = serde_json::to_value(Layer::new(LayerKind::Piano, "Lead")).unwrap();
        json["events"] = serde_json::to_value(vec![late, early]).unwrap();
        let mut layer: Layer = serde_json::from_value(json).unwrap();

        layer.normalize_events().unwrap();
        assert_eq!(layer.events(), &[early, late]);
        assert_eq!(layer.beat_range(), Some((2.0, 9.0)));
    }

    #[test]
    fn test_normalize_events_rejects_repeated_ids() {
        let event = NoteEvent::new(60, 2.0, 1.0, 0.8);
        let mut json = serde_json::to_value(Layer::new(LayerKind::Piano, "Lead")).unwrap();
        json["events"] = serde_json::to_value(vec![event, event]).unwrap();
        let mut layer: Layer = serde_json::from_value(json).unwrap();

        assert_eq!(layer.normalize_events(), Err(event.id));
    }

    #[test]
    fn test_beat_range() {
        let mut layer = Layer::new(LayerKind::Piano, "Lead");
        assert!(layer.beat_range().is_none());

        layer.add_event(NoteEvent::new(60, 2.0, 8.0, 0.8));
        layer.add_event(NoteEvent::new(60, 4.0, 1.0, 0.8));

        let (start, end) = layer.beat_range().unwrap();
        assert_relative_eq!(start, 2.0);
        assert_relative_eq!(end, 10.0);
    }

    #[test]
    fn test_restore_from_snapshot() {
        let mut layer = Layer::new(LayerKind::Piano, "Lead");
        let snapshot = layer.clone();

        layer.set_name("Changed");
        layer.add_event(NoteEvent::new(60, 0.0, 1.0, 0.8));
        let count = layer.mutation_count();

        layer.restore_from(&snapshot);
        assert_eq!(layer, snapshot);
        assert!(layer.mutation_count() > count);
    }

    #[test]
    fn test_mutation_count_not_serialized() {
        let mut layer = Layer::new(LayerKind::Automation, "Volume");
        layer.set_muted(true);

        let json = serde_json::to_value(&layer).unwrap();
        assert!(json.get("mutation_count").is_none());
        assert_eq!(json["kind"], "automation");

        let restored: Layer = serde_json::from_value(json).unwrap();
        assert_eq!(restored, layer);
        assert_eq!(restored.mutation_count(), 0);
    }
}
