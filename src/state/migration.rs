//! Schema migration support for project documents.
//!
//! Handles upgrading documents from older schema versions to the current one.
//! Migrations are applied sequentially, so a document can jump several
//! versions in one load.

use serde_json::Value;

use crate::error::{Result, TrackError};

/// Current schema version for project documents.
pub const CURRENT_SCHEMA_VERSION: &str = "1.1.0";

/// Schema version assumed when a document carries none.
const INITIAL_SCHEMA_VERSION: &str = "1.0.0";

/// Takes a document and returns the migrated document or an error.
type MigrationFn = fn(Value) -> Result<Value>;

/// Known schema versions in order, with the migration leading to each one.
const MIGRATIONS: &[(&str, Option<MigrationFn>)] = &[
    ("1.0.0", None),
    ("1.1.0", Some(migrate_1_0_0_to_1_1_0)),
];

/// Read the schema version of a document.
pub fn schema_version(data: &Value) -> &str {
    data.get("schema_version")
        .and_then(|v| v.as_str())
        .unwrap_or(INITIAL_SCHEMA_VERSION)
}

/// Migrate a document from its schema version to [`CURRENT_SCHEMA_VERSION`].
///
/// # Errors
/// `InvalidSchemaVersion` if the version is unknown, `MigrationError` if the
/// document is newer than this build or a step fails.
pub fn migrate_document(mut data: Value) -> Result<Value> {
    let current_version = schema_version(&data).to_string();

    let position = |version: &str| MIGRATIONS.iter().position(|(v, _)| *v == version);
    let from_idx = position(&current_version).ok_or_else(|| TrackError::InvalidSchemaVersion {
        version: current_version.clone(),
    })?;
    let target_idx = position(CURRENT_SCHEMA_VERSION).unwrap_or(MIGRATIONS.len() - 1);

    if from_idx > target_idx {
        return Err(TrackError::MigrationError {
            from: current_version,
            to: CURRENT_SCHEMA_VERSION.to_string(),
            reason: "Cannot downgrade document from newer schema version".to_string(),
        });
    }

    for (version, migration) in &MIGRATIONS[from_idx + 1..=target_idx] {
        if let Some(migrate) = migration {
            data = migrate(data)?;
        }
        set_schema_version(&mut data, version);
    }

    set_schema_version(&mut data, CURRENT_SCHEMA_VERSION);
    Ok(data)
}

fn set_schema_version(data: &mut Value, version: &str) {
    if let Some(obj) = data.as_object_mut() {
        obj.insert(
            "schema_version".to_string(),
            Value::String(version.to_string()),
        );
    }
}

/// 1.0.0 kept the layer blocks under `tracks`.
fn migrate_1_0_0_to_1_1_0(mut data: Value) -> Result<Value> {
    let obj = data
        .as_object_mut()
        .ok_or_else(|| TrackError::MigrationError {
            from: "1.0.0".to_string(),
            to: "1.1.0".to_string(),
            reason: "Document root is not an object".to_string(),
        })?;

    if let Some(tracks) = obj.remove("tracks") {
        obj.entry("layers".to_string()).or_insert(tracks);
    }
    obj.entry("layers".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    Ok(data)
}
