//! Error handling for trackstate
//!
//! Registry and adapter errors are returned to the immediate caller; nothing
//! in the core is fatal to the process.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for trackstate operations
pub type Result<T> = std::result::Result<T, TrackError>;

/// Main error type for trackstate operations
#[derive(Error, Debug)]
pub enum TrackError {
    // Registry Errors
    #[error("Layer already exists: {id}")]
    DuplicateIdentity { id: Uuid },

    #[error("Not found: {id}")]
    NotFound { id: Uuid },

    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unsupported tracked item type: {type_tag}")]
    UnsupportedType { type_tag: String },

    // Document Errors
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },

    #[error("Invalid document schema version: {version}")]
    InvalidSchemaVersion { version: String },

    #[error("Migration failed from {from} to {to}: {reason}")]
    MigrationError {
        from: String,
        to: String,
        reason: String,
    },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Network Errors
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    // Generic Errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            TrackError::DuplicateIdentity { .. } => "DUPLICATE_IDENTITY",
            TrackError::NotFound { .. } => "NOT_FOUND",
            TrackError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            TrackError::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            TrackError::InvalidDocument { .. } => "INVALID_DOCUMENT",
            TrackError::InvalidSchemaVersion { .. } => "INVALID_SCHEMA_VERSION",
            TrackError::MigrationError { .. } => "MIGRATION_ERROR",
            TrackError::FileNotFound { .. } => "FILE_NOT_FOUND",
            TrackError::FileReadError { .. } => "FILE_READ_ERROR",
            TrackError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            TrackError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            TrackError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            TrackError::Internal(_) => "INTERNAL",
            TrackError::Io(_) => "IO_ERROR",
            TrackError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the caller can recover from this error locally
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TrackError::Internal(_))
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackError::ConnectionFailed { .. } | TrackError::FileWriteError { .. }
        )
    }

    /// Returns a user-facing recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            TrackError::DuplicateIdentity { .. } => {
                Some("A layer with this id already exists; generate a new id.")
            }
            TrackError::NotFound { .. } => Some("The layer may have been deleted already."),
            TrackError::FileNotFound { .. } => Some("Check the file path and try again."),
            TrackError::InvalidSchemaVersion { .. } => {
                Some("The document was written by a newer version of trackstate.")
            }
            TrackError::ConnectionFailed { .. } => Some("Check the network connection."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = TrackError::NotFound { id: Uuid::nil() };
        assert_eq!(err.error_code(), "NOT_FOUND");

        let err = TrackError::UnsupportedType {
            type_tag: "Sampler".to_string(),
        };
        assert_eq!(err.error_code(), "UNSUPPORTED_TYPE");
        assert_eq!(err.to_string(), "Unsupported tracked item type: Sampler");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = TrackError::DuplicateIdentity { id: Uuid::new_v4() };
        assert!(err.recovery_suggestion().is_some());
        assert!(err.is_recoverable());
        assert!(!err.is_retryable());

        assert!(TrackError::ConnectionFailed {
            reason: "timeout".to_string()
        }
        .is_retryable());
        assert!(!TrackError::Internal("bug".to_string()).is_recoverable());
    }
}
