//! Autosaver for projects.
//!
//! Provides automatic periodic saving of project state to prevent data loss.
//! Autosaves are stored as JSON files in a backups directory and are
//! rotated to prevent disk space bloat.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::AutosaveConfig;
use crate::error::{Result, TrackError};
use crate::state::project::Project;
use crate::state::storage::DocumentStore;

/// Prefix for autosave filenames.
const AUTOSAVE_PREFIX: &str = "autosave_";

/// Extension for autosave files.
const AUTOSAVE_EXTENSION: &str = ".json";

/// Manages automatic periodic saving of project state.
#[derive(Debug, Clone)]
pub struct Autosaver {
    /// Interval between autosaves in seconds.
    pub autosave_interval_seconds: u64,

    /// Maximum number of autosave files to retain.
    pub max_autosaves: usize,

    /// Timestamp of the last successful autosave.
    pub last_save_time: Option<DateTime<Utc>>,
}

impl Default for Autosaver {
    fn default() -> Self {
        Self::new(&AutosaveConfig::default())
    }
}

impl Autosaver {
    pub fn new(config: &AutosaveConfig) -> Self {
        Self {
            autosave_interval_seconds: config.interval_seconds,
            max_autosaves: config.max_autosaves,
            last_save_time: None,
        }
    }

    /// Check if an autosave should be performed.
    ///
    /// Returns true if the project has unsaved changes and enough time has
    /// elapsed since the last autosave.
    pub fn should_autosave(&self, project: &Project) -> bool {
        if !project.is_dirty() {
            return false;
        }

        match self.last_save_time {
            None => true,
            Some(last_time) => {
                let elapsed = Utc::now().signed_duration_since(last_time);
                elapsed.num_seconds() >= self.autosave_interval_seconds as i64
            }
        }
    }

    /// Write the project state to `backups_dir` under a timestamped name.
    ///
    /// Returns `None` if the store declined to write; the interval timer is
    /// not reset then. The project itself stays dirty: an autosave is not a
    /// save.
    pub fn autosave(
        &mut self,
        project: &Project,
        store: &dyn DocumentStore,
        backups_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        if !backups_dir.exists() {
            fs::create_dir_all(backups_dir).map_err(|e| TrackError::DirectoryCreateError {
                path: backups_dir.to_path_buf(),
                source: e,
            })?;
        }

        // autosave_YYYYMMDD_HHMMSS_mmm.json
        let now = Utc::now();
        let timestamp = now.format("%Y%m%d_%H%M%S_%3f");
        let filename = format!("{}{}{}", AUTOSAVE_PREFIX, timestamp, AUTOSAVE_EXTENSION);
        let autosave_path = backups_dir.join(&filename);

        if !store.save(&autosave_path, &project.serialize()?)? {
            debug!(path = %autosave_path.display(), "store declined autosave");
            return Ok(None);
        }
        self.last_save_time = Some(now);
        self.rotate_autosaves(backups_dir)?;

        Ok(Some(autosave_path))
    }

    /// Delete the oldest autosave files beyond `max_autosaves`.
    pub fn rotate_autosaves(&self, backups_dir: &Path) -> Result<()> {
        let mut autosaves = Self::list_autosaves(backups_dir)?;

        while autosaves.len() > self.max_autosaves {
            // Newest first, so the oldest is at the end
            if let Some(oldest) = autosaves.pop() {
                fs::remove_file(&oldest).map_err(|e| TrackError::FileWriteError {
                    path: oldest,
                    source: e,
                })?;
            }
        }

        Ok(())
    }

    /// List autosave files in `backups_dir`, newest first.
    pub fn list_autosaves(backups_dir: &Path) -> Result<Vec<PathBuf>> {
        if !backups_dir.exists() {
            return Ok(Vec::new());
        }

        let mut autosaves: Vec<PathBuf> = WalkDir::new(backups_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                name.starts_with(AUTOSAVE_PREFIX) && name.ends_with(AUTOSAVE_EXTENSION)
            })
            .map(|entry| entry.path().to_path_buf())
            .collect();

        // The timestamp in the name sorts lexicographically.
        autosaves.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

        Ok(autosaves)
    }

    /// Most recent autosave, if any.
    pub fn latest_autosave(backups_dir: &Path) -> Result<Option<PathBuf>> {
        Ok(Self::list_autosaves(backups_dir)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::layers::LayerKind;
    use crate::state::storage::JsonDocumentStore;
    use serde_json::Value;
    use tempfile::TempDir;

    fn dirty_project() -> Project {
        let mut project = Project::new("Autosaved", &Config::default());
        project.add_layer(LayerKind::Piano, "Lead").unwrap();
        project
    }

    #[test]
    fn test_clean_project_not_autosaved() {
        let autosaver = Autosaver::default();
        let project = Project::new("Clean", &Config::default());
        assert!(!autosaver.should_autosave(&project));
        assert!(autosaver.should_autosave(&dirty_project()));
    }

    #[test]
    fn test_interval_respected() {
        let mut autosaver = Autosaver::default();
        autosaver.last_save_time = Some(Utc::now());
        assert!(!autosaver.should_autosave(&dirty_project()));

        autosaver.autosave_interval_seconds = 0;
        assert!(autosaver.should_autosave(&dirty_project()));
    }

    #[test]
    fn test_autosave_writes_loadable_document() {
        let temp_dir = TempDir::new().unwrap();
        let project = dirty_project();
        let mut autosaver = Autosaver::default();

        let path = autosaver
            .autosave(&project, &JsonDocumentStore, temp_dir.path())
            .unwrap()
            .unwrap();
        assert!(path.exists());
        assert!(autosaver.last_save_time.is_some());
        assert!(project.is_dirty());

        let raw = JsonDocumentStore.load(&path).unwrap();
        let mut restored = Project::new("Empty", &Config::default());
        restored.deserialize(raw).unwrap();
        assert_eq!(restored.layers().len(), 1);
    }

    struct DecliningStore;

    impl DocumentStore for DecliningStore {
        fn load(&self, path: &Path) -> Result<Value> {
            Err(TrackError::FileNotFound {
                path: path.to_path_buf(),
            })
        }

        fn save(&self, _path: &Path, _state: &Value) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_declined_autosave_keeps_timer() {
        let temp_dir = TempDir::new().unwrap();
        let project = dirty_project();
        let mut autosaver = Autosaver::default();

        let written = autosaver
            .autosave(&project, &DecliningStore, temp_dir.path())
            .unwrap();
        assert!(written.is_none());
        assert!(autosaver.last_save_time.is_none());
        assert!(autosaver.should_autosave(&project));
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "autosave_20240101_000000_000.json",
            "autosave_20240102_000000_000.json",
            "autosave_20240103_000000_000.json",
            "notes.txt",
        ] {
            fs::write(temp_dir.path().join(name), "{}").unwrap();
        }

        let autosaver = Autosaver {
            max_autosaves: 2,
            ..Autosaver::default()
        };
        autosaver.rotate_autosaves(temp_dir.path()).unwrap();

        let remaining = Autosaver::list_autosaves(temp_dir.path()).unwrap();
        let names: Vec<String> = remaining
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "autosave_20240103_000000_000.json",
                "autosave_20240102_000000_000.json"
            ]
        );
        assert!(temp_dir.path().join("notes.txt").exists());
        assert_eq!(
            Autosaver::latest_autosave(temp_dir.path()).unwrap(),
            Some(remaining[0].clone())
        );
    }

    #[test]
    fn test_list_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("backups");
        assert!(Autosaver::list_autosaves(&missing).unwrap().is_empty());
    }
}
