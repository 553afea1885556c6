//! Project-level metadata, tracked by the VCS engine alongside the layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descriptive metadata of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Identity of the metadata block.
    pub id: Uuid,

    /// Project title.
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub license: String,

    /// Timestamp when the project was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last save.
    pub modified_at: DateTime<Utc>,
}

impl ProjectInfo {
    /// Create metadata for a new project.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: String::new(),
            description: String::new(),
            license: String::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Mark the metadata as saved now.
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
