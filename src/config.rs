//! Configuration
//!
//! Values are read once at startup (`Config::from_env` or `Config::from_file`)
//! and passed explicitly to the components that need them.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TrackError};
use crate::state::undo::DEFAULT_MAX_UNDO_LEVELS;

/// Default autosave interval in seconds.
const DEFAULT_AUTOSAVE_INTERVAL: u64 = 60;

/// Default maximum number of autosaves to retain.
const DEFAULT_MAX_AUTOSAVES: usize = 10;

/// Default number of logout attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

const DEFAULT_LOGOUT_URL: &str = "http://localhost:8080/api/v1/logout";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub undo: UndoConfig,
    pub autosave: AutosaveConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Maximum number of undo steps kept per project.
    pub max_levels: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_UNDO_LEVELS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub interval_seconds: u64,
    pub max_autosaves: usize,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_AUTOSAVE_INTERVAL,
            max_autosaves: DEFAULT_MAX_AUTOSAVES,
        }
    }
}

/// Identity of this machine, sent with account requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Resolve the machine identity.
    ///
    /// `TRACKSTATE_MACHINE_ID`, then `/etc/machine-id`, then a random id.
    pub fn detect() -> Self {
        if let Ok(id) = env::var("TRACKSTATE_MACHINE_ID") {
            if !id.trim().is_empty() {
                return Self(id.trim().to_string());
            }
        }

        fs::read_to_string("/etc/machine-id")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Self)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub logout_url: String,
    /// Salt mixed into the device check hash.
    pub salt: String,
    pub machine_id: MachineId,
    /// Maximum number of connection attempts per request.
    pub attempts: u32,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            logout_url: DEFAULT_LOGOUT_URL.to_string(),
            salt: String::new(),
            machine_id: MachineId::default(),
            attempts: DEFAULT_CONNECT_ATTEMPTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("trackstate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Build configuration from `TRACKSTATE_*` environment variables over defaults.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.network.machine_id = MachineId::detect();
        config.apply_env();
        config
    }

    /// Load a JSON configuration file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrackError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| TrackError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(levels) = env_parse("TRACKSTATE_MAX_UNDO_LEVELS") {
            self.undo.max_levels = levels;
        }
        if let Some(interval) = env_parse("TRACKSTATE_AUTOSAVE_INTERVAL") {
            self.autosave.interval_seconds = interval;
        }
        if let Some(max) = env_parse("TRACKSTATE_MAX_AUTOSAVES") {
            self.autosave.max_autosaves = max;
        }
        if let Ok(url) = env::var("TRACKSTATE_LOGOUT_URL") {
            self.network.logout_url = url;
        }
        if let Ok(salt) = env::var("TRACKSTATE_SALT") {
            self.network.salt = salt;
        }
        if let Some(attempts) = env_parse("TRACKSTATE_CONNECT_ATTEMPTS") {
            self.network.attempts = attempts;
        }
        if let Some(timeout) = env_parse("TRACKSTATE_TIMEOUT_MS") {
            self.network.timeout_ms = timeout;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
