//! State Management Module
//!
//! Provides the project composition root, undo/redo, change notification,
//! autosave, migrations, and document storage.

pub mod autosave;
pub mod info;
pub mod migration;
pub mod notifier;
pub mod project;
pub mod storage;
pub mod undo;

pub use autosave::Autosaver;
pub use info::ProjectInfo;
pub use migration::{migrate_document, CURRENT_SCHEMA_VERSION};
pub use notifier::{ChangeEvent, ChangeListener, ChangeNotifier, ListenerId};
pub use project::Project;
pub use storage::{spawn_load, DocumentStore, JsonDocumentStore, ProjectDocument};
pub use undo::{
    ActionType, LayerEdit, UndoAction, UndoContext, UndoGroup, UndoHistory, UndoOutcome,
    UndoRecord, DEFAULT_MAX_UNDO_LEVELS,
};
