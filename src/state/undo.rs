//! Undo/Redo System
//!
//! Every mutation of a project is expressed as an [`UndoRecord`] that knows how
//! to apply itself and how to produce its inverse. Records reference layers by
//! identity and carry value snapshots, never strong handles.
//!
//! Records are grouped into steps. A [`UndoHistory::checkpoint`] closes the
//! current step; every record performed until the next checkpoint joins the
//! same step and is undone by a single [`UndoHistory::undo`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TrackError};
use crate::layers::{Layer, LayerRegistry, NoteEvent};
use crate::state::info::ProjectInfo;
use crate::state::notifier::ChangeEvent;

/// Default maximum number of undo steps to keep.
pub const DEFAULT_MAX_UNDO_LEVELS: usize = 50;

/// What an undo record operates on.
pub struct UndoContext<'a> {
    pub layers: &'a LayerRegistry,
    pub info: &'a mut ProjectInfo,
}

/// Types of actions that can be undone/redone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateLayer,
    DeleteLayer,
    MoveLayer,
    EditLayer,
    InfoChange,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::CreateLayer => write!(f, "Create Layer"),
            ActionType::DeleteLayer => write!(f, "Delete Layer"),
            ActionType::MoveLayer => write!(f, "Move Layer"),
            ActionType::EditLayer => write!(f, "Edit Layer"),
            ActionType::InfoChange => write!(f, "Info Change"),
        }
    }
}

/// An in-place change to one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum LayerEdit {
    AddEvent { event: NoteEvent },
    RemoveEvent { event: NoteEvent },
    ChangeEvent { old: NoteEvent, new: NoteEvent },
    Rename { old: String, new: String },
    SetMuted { old: bool, new: bool },
}

impl LayerEdit {
    pub fn inverse(&self) -> LayerEdit {
        match self {
            LayerEdit::AddEvent { event } => LayerEdit::RemoveEvent { event: *event },
            LayerEdit::RemoveEvent { event } => LayerEdit::AddEvent { event: *event },
            LayerEdit::ChangeEvent { old, new } => LayerEdit::ChangeEvent {
                old: *new,
                new: *old,
            },
            LayerEdit::Rename { old, new } => LayerEdit::Rename {
                old: new.clone(),
                new: old.clone(),
            },
            LayerEdit::SetMuted { old, new } => LayerEdit::SetMuted {
                old: *new,
                new: *old,
            },
        }
    }

    /// Apply to a layer. Either the whole edit applies or the layer is untouched.
    fn apply(&self, layer: &mut Layer) -> Result<Vec<ChangeEvent>> {
        let id = layer.id();
        match self {
            LayerEdit::AddEvent { event } => {
                if !layer.add_event(*event) {
                    return Err(TrackError::DuplicateIdentity { id: event.id });
                }
                Ok(vec![ChangeEvent::EventAdded {
                    layer: id,
                    event: *event,
                }])
            }
            LayerEdit::RemoveEvent { event } => {
                let removed = layer
                    .remove_event(&event.id)
                    .ok_or(TrackError::NotFound { id: event.id })?;
                Ok(vec![
                    ChangeEvent::EventRemoved {
                        layer: id,
                        event: removed,
                    },
                    ChangeEvent::EventRemovedPostAction { layer: id },
                ])
            }
            LayerEdit::ChangeEvent { old, new } => {
                let previous = layer
                    .change_event(&old.id, *new)
                    .ok_or(TrackError::NotFound { id: old.id })?;
                let current = layer.event(&old.id).copied().unwrap_or(*new);
                Ok(vec![ChangeEvent::EventChanged {
                    layer: id,
                    old: previous,
                    new: current,
                }])
            }
            LayerEdit::Rename { new, .. } => {
                layer.set_name(new.clone());
                Ok(vec![ChangeEvent::LayerChanged { layer: id }])
            }
            LayerEdit::SetMuted { new, .. } => {
                layer.set_muted(*new);
                Ok(vec![ChangeEvent::LayerChanged { layer: id }])
            }
        }
    }
}

/// An invertible description of one mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoRecord {
    InsertLayer { index: usize, snapshot: Layer },
    RemoveLayer { index: usize, snapshot: Layer },
    MoveLayer { id: Uuid, from: usize, to: usize },
    EditLayer { id: Uuid, edit: LayerEdit },
    ChangeInfo { before: ProjectInfo, after: ProjectInfo },
}

impl UndoRecord {
    pub fn action_type(&self) -> ActionType {
        match self {
            UndoRecord::InsertLayer { .. } => ActionType::CreateLayer,
            UndoRecord::RemoveLayer { .. } => ActionType::DeleteLayer,
            UndoRecord::MoveLayer { .. } => ActionType::MoveLayer,
            UndoRecord::EditLayer { .. } => ActionType::EditLayer,
            UndoRecord::ChangeInfo { .. } => ActionType::InfoChange,
        }
    }

    /// Record that undoes this one.
    pub fn inverse(&self) -> UndoRecord {
        match self {
            UndoRecord::InsertLayer { index, snapshot } => UndoRecord::RemoveLayer {
                index: *index,
                snapshot: snapshot.clone(),
            },
            UndoRecord::RemoveLayer { index, snapshot } => UndoRecord::InsertLayer {
                index: *index,
                snapshot: snapshot.clone(),
            },
            UndoRecord::MoveLayer { id, from, to } => UndoRecord::MoveLayer {
                id: *id,
                from: *to,
                to: *from,
            },
            UndoRecord::EditLayer { id, edit } => UndoRecord::EditLayer {
                id: *id,
                edit: edit.inverse(),
            },
            UndoRecord::ChangeInfo { before, after } => UndoRecord::ChangeInfo {
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    pub fn forward(&self, ctx: &mut UndoContext<'_>) -> Result<Vec<ChangeEvent>> {
        self.apply(ctx)
    }

    pub fn backward(&self, ctx: &mut UndoContext<'_>) -> Result<Vec<ChangeEvent>> {
        self.inverse().apply(ctx)
    }

    fn apply(&self, ctx: &mut UndoContext<'_>) -> Result<Vec<ChangeEvent>> {
        match self {
            UndoRecord::InsertLayer { index, snapshot } => {
                ctx.layers.insert_at(*index, snapshot.clone())?;
                Ok(vec![ChangeEvent::LayerAdded {
                    layer: snapshot.id(),
                    kind: snapshot.kind(),
                }])
            }
            UndoRecord::RemoveLayer { snapshot, .. } => {
                ctx.layers.remove(&snapshot.id())?;
                Ok(vec![ChangeEvent::LayerRemoved {
                    layer: snapshot.id(),
                    kind: snapshot.kind(),
                }])
            }
            UndoRecord::MoveLayer { id, from, to } => {
                ctx.layers.move_layer(id, *to)?;
                Ok(vec![ChangeEvent::LayerMoved {
                    layer: *id,
                    from: *from,
                    to: *to,
                }])
            }
            UndoRecord::EditLayer { id, edit } => ctx.layers.update(id, |layer| edit.apply(layer))?,
            UndoRecord::ChangeInfo { after, .. } => {
                // The save timestamp is not part of the edit.
                let modified_at = ctx.info.modified_at;
                *ctx.info = after.clone();
                ctx.info.modified_at = modified_at;
                Ok(vec![ChangeEvent::InfoChanged(ctx.info.clone())])
            }
        }
    }

    /// Human-readable description of the record.
    pub fn describe(&self) -> String {
        match self {
            UndoRecord::InsertLayer { snapshot, .. } => format!("Add layer '{}'", snapshot.name()),
            UndoRecord::RemoveLayer { snapshot, .. } => {
                format!("Delete layer '{}'", snapshot.name())
            }
            UndoRecord::MoveLayer { from, to, .. } => format!("Move layer {} -> {}", from, to),
            UndoRecord::EditLayer { edit, .. } => match edit {
                LayerEdit::AddEvent { .. } => "Add event".to_string(),
                LayerEdit::RemoveEvent { .. } => "Remove event".to_string(),
                LayerEdit::ChangeEvent { .. } => "Change event".to_string(),
                LayerEdit::Rename { new, .. } => format!("Rename layer to '{}'", new),
                LayerEdit::SetMuted { new: true, .. } => "Mute layer".to_string(),
                LayerEdit::SetMuted { new: false, .. } => "Unmute layer".to_string(),
            },
            UndoRecord::ChangeInfo { .. } => "Change project info".to_string(),
        }
    }
}

/// A single undoable action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoAction {
    /// Unique identifier for this action.
    pub id: String,

    /// Type of action performed.
    pub action_type: ActionType,

    /// Human-readable description of the action.
    pub description: String,

    /// When the action was performed.
    pub timestamp: DateTime<Utc>,

    /// The reversible mutation.
    pub record: UndoRecord,
}

impl UndoAction {
    pub fn new(record: UndoRecord) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action_type: record.action_type(),
            description: record.describe(),
            timestamp: Utc::now(),
            record,
        }
    }
}

/// One undo step: the actions performed between two checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoGroup {
    label: Option<String>,
    actions: Vec<UndoAction>,
}

impl UndoGroup {
    fn new(label: Option<String>, first: UndoAction) -> Self {
        Self {
            label,
            actions: vec![first],
        }
    }

    /// Checkpoint name, if the step was opened by a named checkpoint.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn actions(&self) -> &[UndoAction] {
        &self.actions
    }

    /// Label, or the description of the first action.
    pub fn description(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self
                .actions
                .first()
                .map(|a| a.description.clone())
                .unwrap_or_default(),
        }
    }
}

/// Result of an undo or redo request.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    /// A step was reverted or re-applied.
    Applied {
        description: String,
        events: Vec<ChangeEvent>,
    },
    NothingToUndo,
    NothingToRedo,
}

impl UndoOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UndoOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Backward,
    Forward,
}

/// Past and future undo steps of a project.
///
/// Only the control thread touches the history, so it carries no lock.
#[derive(Debug, Clone)]
pub struct UndoHistory {
    /// Steps that can be undone, oldest first.
    past: Vec<UndoGroup>,

    /// Steps that can be redone, most recently undone last.
    future: Vec<UndoGroup>,

    /// Whether the next performed record joins the last step in `past`.
    group_open: bool,

    /// Label for the step opened by the next performed record.
    pending_label: Option<String>,

    /// Maximum number of steps to keep.
    max_undo_levels: usize,

    /// IDs of actions that were discarded by trimming or clearing.
    discarded_action_ids: Vec<String>,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_LEVELS)
    }
}

impl UndoHistory {
    pub fn new(max_levels: usize) -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
            group_open: false,
            pending_label: None,
            max_undo_levels: max_levels,
            discarded_action_ids: Vec::new(),
        }
    }

    /// Close the current step.
    pub fn checkpoint(&mut self) {
        self.group_open = false;
        self.pending_label = None;
    }

    /// Close the current step and name the next one.
    pub fn checkpoint_named(&mut self, label: impl Into<String>) {
        self.group_open = false;
        self.pending_label = Some(label.into());
    }

    /// Apply a record and append it to the history.
    ///
    /// On failure the record is not recorded and the history is unchanged.
    /// On success the redo sequence is discarded.
    pub fn perform(
        &mut self,
        record: UndoRecord,
        ctx: &mut UndoContext<'_>,
    ) -> Result<Vec<ChangeEvent>> {
        let events = record.forward(ctx)?;
        let action = UndoAction::new(record);
        debug!(action = %action.action_type, "performed {}", action.description);

        for group in self.future.drain(..) {
            self.discarded_action_ids
                .extend(group.actions.into_iter().map(|a| a.id));
        }

        match self.past.last_mut() {
            Some(group) if self.group_open => group.actions.push(action),
            _ => {
                self.past
                    .push(UndoGroup::new(self.pending_label.take(), action));
                self.group_open = true;
            }
        }

        self.trim_history();
        Ok(events)
    }

    /// Revert the most recent step.
    pub fn undo(&mut self, ctx: &mut UndoContext<'_>) -> Result<UndoOutcome> {
        let Some(group) = self.past.pop() else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        match Self::apply_group(&group, ctx, Direction::Backward) {
            Ok(events) => {
                let description = group.description();
                self.future.push(group);
                self.group_open = false;
                Ok(UndoOutcome::Applied {
                    description,
                    events,
                })
            }
            Err(e) => {
                self.past.push(group);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone step.
    pub fn redo(&mut self, ctx: &mut UndoContext<'_>) -> Result<UndoOutcome> {
        let Some(group) = self.future.pop() else {
            return Ok(UndoOutcome::NothingToRedo);
        };

        match Self::apply_group(&group, ctx, Direction::Forward) {
            Ok(events) => {
                let description = group.description();
                self.past.push(group);
                self.group_open = false;
                Ok(UndoOutcome::Applied {
                    description,
                    events,
                })
            }
            Err(e) => {
                self.future.push(group);
                Err(e)
            }
        }
    }

    /// Apply every action of a step. If one fails, the ones already applied
    /// are reverted so the target ends up where it started.
    fn apply_group(
        group: &UndoGroup,
        ctx: &mut UndoContext<'_>,
        direction: Direction,
    ) -> Result<Vec<ChangeEvent>> {
        let ordered: Vec<&UndoAction> = match direction {
            Direction::Forward => group.actions.iter().collect(),
            Direction::Backward => group.actions.iter().rev().collect(),
        };

        let mut events = Vec::new();
        for (done, action) in ordered.iter().enumerate() {
            let applied = match direction {
                Direction::Forward => action.record.forward(ctx),
                Direction::Backward => action.record.backward(ctx),
            };

            match applied {
                Ok(mut produced) => events.append(&mut produced),
                Err(e) => {
                    for rollback in ordered[..done].iter().rev() {
                        let reverted = match direction {
                            Direction::Forward => rollback.record.backward(ctx),
                            Direction::Backward => rollback.record.forward(ctx),
                        };
                        if let Err(rollback_err) = reverted {
                            warn!(
                                action = %rollback.id,
                                "failed to roll back undo action: {}", rollback_err
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(events)
    }

    /// Discard the whole history.
    pub fn clear(&mut self) {
        for group in self.past.drain(..).chain(self.future.drain(..)) {
            self.discarded_action_ids
                .extend(group.actions.into_iter().map(|a| a.id));
        }
        self.group_open = false;
        self.pending_label = None;
    }

    /// Trim the oldest steps beyond `max_undo_levels`.
    pub fn trim_history(&mut self) {
        if self.past.len() <= self.max_undo_levels {
            return;
        }
        let excess = self.past.len() - self.max_undo_levels;
        for group in self.past.drain(..excess) {
            self.discarded_action_ids
                .extend(group.actions.into_iter().map(|a| a.id));
        }
        if self.past.is_empty() {
            self.group_open = false;
        }
    }

    pub fn max_undo_levels(&self) -> usize {
        self.max_undo_levels
    }

    pub fn set_max_undo_levels(&mut self, max_levels: usize) {
        self.max_undo_levels = max_levels;
        self.trim_history();
    }

    pub fn discarded_action_ids(&self) -> &[String] {
        &self.discarded_action_ids
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Number of steps that can be undone.
    pub fn undo_count(&self) -> usize {
        self.past.len()
    }

    /// Number of steps that can be redone.
    pub fn redo_count(&self) -> usize {
        self.future.len()
    }

    pub fn peek_undo(&self) -> Option<&UndoGroup> {
        self.past.last()
    }

    pub fn peek_redo(&self) -> Option<&UndoGroup> {
        self.future.last()
    }

    /// Undo step descriptions, most recent first.
    pub fn undo_stack_summary(&self) -> Vec<String> {
        self.past.iter().rev().map(UndoGroup::description).collect()
    }

    /// Redo step descriptions, most recently undone first.
    pub fn redo_stack_summary(&self) -> Vec<String> {
        self.future.iter().rev().map(UndoGroup::description).collect()
    }
}
