//! Document Storage
//!
//! The persisted project is a JSON element tree: a header, one self-describing
//! block for the project info, and one block per layer. Blocks carry their
//! type tag and identity so each can be rebuilt through the tracked-item
//! protocol.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::control::ControlPoster;
use crate::error::{Result, TrackError};
use crate::state::project::Project;
use crate::vcs::TrackedItem;

/// Extension used for project documents.
pub const PROJECT_EXTENSION: &str = "json";

/// Loads and saves raw project documents.
pub trait DocumentStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Value>;

    /// Returns false if the store declined to write.
    fn save(&self, path: &Path, state: &Value) -> Result<bool>;
}

/// Serialized form of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub schema_version: String,

    pub name: String,

    /// Project info block.
    pub info: TrackedItem,

    /// Layer blocks in registry order.
    #[serde(default)]
    pub layers: Vec<TrackedItem>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, Value>,
}

/// Pretty-printed JSON files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentStore;

impl DocumentStore for JsonDocumentStore {
    fn load(&self, path: &Path) -> Result<Value> {
        if !path.exists() {
            return Err(TrackError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| TrackError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, path: &Path, state: &Value) -> Result<bool> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| TrackError::DirectoryCreateError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        // Write beside the target, then rename over it.
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&temp_path, content).map_err(|e| TrackError::FileWriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        fs::rename(&temp_path, path).map_err(|e| TrackError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), "saved document");
        Ok(true)
    }
}

/// Read a document on a worker thread and apply it on the control thread.
///
/// `on_done` runs on the control thread with the outcome of the load.
pub fn spawn_load(
    store: Arc<dyn DocumentStore>,
    path: PathBuf,
    poster: ControlPoster<Project>,
    on_done: impl FnOnce(&mut Project, Result<()>) + Send + 'static,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("document-load".to_string())
        .spawn(move || {
            let loaded = store.load(&path);
            let target = path.display().to_string();
            let posted = poster.post(move |project: &mut Project| {
                let result = loaded.and_then(|raw| project.deserialize(raw));
                if result.is_ok() {
                    project.set_document_path(path);
                }
                on_done(project, result);
            });
            if !posted {
                debug!(path = %target, "control queue closed, loaded document dropped");
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlQueue;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("song.json");
        let doc = json!({ "schema_version": "1.1.0", "name": "Song" });

        assert!(JsonDocumentStore.save(&path, &doc).unwrap());
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(JsonDocumentStore.load(&path).unwrap(), doc);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = JsonDocumentStore
            .load(&temp_dir.path().join("missing.json"))
            .unwrap_err();
        assert!(matches!(err, TrackError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_after_queue_closed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song.json");
        JsonDocumentStore
            .save(&path, &json!({ "schema_version": "1.1.0" }))
            .unwrap();

        let queue: ControlQueue<Project> = ControlQueue::new();
        let poster = queue.poster();
        drop(queue);

        let handle = spawn_load(Arc::new(JsonDocumentStore), path, poster, |_, _| {
            panic!("nothing may run without a control thread")
        })
        .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonDocumentStore.load(&path).unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }
}
