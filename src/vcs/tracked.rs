//! Tracked item views.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, TrackError};
use crate::layers::{Layer, LayerKind};
use crate::state::ProjectInfo;

/// Type tags understood by the version-control engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackedType {
    PianoLayer,
    AutomationLayer,
    AnnotationsLayer,
    ProjectInfo,
}

impl TrackedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedType::PianoLayer => "PianoLayer",
            TrackedType::AutomationLayer => "AutomationLayer",
            TrackedType::AnnotationsLayer => "AnnotationsLayer",
            TrackedType::ProjectInfo => "ProjectInfo",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PianoLayer" => Some(TrackedType::PianoLayer),
            "AutomationLayer" => Some(TrackedType::AutomationLayer),
            "AnnotationsLayer" => Some(TrackedType::AnnotationsLayer),
            "ProjectInfo" => Some(TrackedType::ProjectInfo),
            _ => None,
        }
    }

    /// Layer kind for layer tags, `None` for project metadata.
    pub fn layer_kind(&self) -> Option<LayerKind> {
        match self {
            TrackedType::PianoLayer => Some(LayerKind::Piano),
            TrackedType::AutomationLayer => Some(LayerKind::Automation),
            TrackedType::AnnotationsLayer => Some(LayerKind::Annotations),
            TrackedType::ProjectInfo => None,
        }
    }
}

impl From<LayerKind> for TrackedType {
    fn from(kind: LayerKind) -> Self {
        match kind {
            LayerKind::Piano => TrackedType::PianoLayer,
            LayerKind::Automation => TrackedType::AutomationLayer,
            LayerKind::Annotations => TrackedType::AnnotationsLayer,
        }
    }
}

impl fmt::Display for TrackedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Read-only, serializable projection of a layer or of the project info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    #[serde(rename = "type")]
    pub type_tag: TrackedType,
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub state: Value,
}

impl TrackedItem {
    pub fn from_layer(layer: &Layer) -> Result<Self> {
        Ok(Self {
            type_tag: layer.kind().into(),
            id: layer.id(),
            name: layer.name().to_string(),
            state: serde_json::to_value(layer)?,
        })
    }

    pub fn from_info(info: &ProjectInfo) -> Result<Self> {
        Ok(Self {
            type_tag: TrackedType::ProjectInfo,
            id: info.id,
            name: info.title.clone(),
            state: serde_json::to_value(info)?,
        })
    }

    /// Reconstruct the layer carried by this block.
    ///
    /// The identity and kind inside the state must agree with the block header.
    /// Events come back ordered by beat; repeated event ids are rejected.
    pub fn to_layer(&self) -> Result<Layer> {
        let kind = self
            .type_tag
            .layer_kind()
            .ok_or_else(|| TrackError::InvalidDocument {
                reason: format!("{} block is not a layer", self.type_tag),
            })?;

        let mut layer: Layer = serde_json::from_value(self.state.clone())?;
        if layer.id() != self.id || layer.kind() != kind {
            return Err(TrackError::InvalidDocument {
                reason: format!("layer block {} does not match its header", self.id),
            });
        }
        layer
            .normalize_events()
            .map_err(|event| TrackError::InvalidDocument {
                reason: format!("layer block {} repeats event {}", self.id, event),
            })?;
        Ok(layer)
    }

    /// Reconstruct the project info carried by this block.
    pub fn to_info(&self) -> Result<ProjectInfo> {
        if self.type_tag != TrackedType::ProjectInfo {
            return Err(TrackError::InvalidDocument {
                reason: format!("{} block is not project info", self.type_tag),
            });
        }
        let mut info: ProjectInfo = serde_json::from_value(self.state.clone())?;
        info.id = self.id;
        Ok(info)
    }
}
