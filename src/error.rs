//! Error types for savesync
//!
//! Every fallible operation in the crate returns [`Result<T>`]. The variants
//! fall into two groups:
//!
//! - **Operation-level** errors (`InvalidName`, `DuplicateName`, `NotFound`,
//!   `SourceNotFound`, `PathInvalid`, `SnapshotRequired`) abort the operation
//!   that raised them before anything is mutated.
//! - **Plumbing** errors (`Io`, `Json`, `WalkDir`, `Archive`, `Remote`, ...)
//!   surface failures of the filesystem or of a collaborator.
//!
//! Per-file failures inside a mirror, a snapshot or a recursive copy are never
//! returned as errors; they are counted in the operation's report instead.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the savesync library
pub type Result<T> = std::result::Result<T, SaveSyncError>;

/// Main error type for all savesync operations
#[derive(Debug, Error)]
pub enum SaveSyncError {
    /// Backup name is empty or contains forbidden characters
    #[error("Invalid backup name {name:?}: {reason}")]
    InvalidName {
        /// Name as supplied by the caller
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A backup with the same normalized name is already registered
    #[error("A backup named '{0}' already exists")]
    DuplicateName(String),

    /// No backup is registered under this name
    #[error("Backup not found: {0}")]
    NotFound(String),

    /// The source tree is missing at the time it is needed
    #[error("Source path not found: {0:?}")]
    SourceNotFound(PathBuf),

    /// A backup or destination path is missing, corrupted or of the wrong kind
    #[error("Invalid path {path:?}: {reason}")]
    PathInvalid {
        /// Offending path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// The caller asked for snapshot-or-abort and the snapshot failed
    #[error("Safety snapshot of {subject:?} failed, operation aborted: {reason}")]
    SnapshotRequired {
        /// Tree that could not be protected
        subject: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or catalog is unreadable or corrupt
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Archive container is malformed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Remote blob store reported a failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bincode::error::DecodeError> for SaveSyncError {
    fn from(err: bincode::error::DecodeError) -> Self {
        SaveSyncError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for SaveSyncError {
    fn from(err: bincode::error::EncodeError) -> Self {
        SaveSyncError::Bincode(err.to_string())
    }
}

impl SaveSyncError {
    /// Create an invalid-name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SaveSyncError::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-path error
    pub fn path_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SaveSyncError::PathInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        SaveSyncError::Config(msg.into())
    }

    /// Create an archive error with a custom message
    pub fn archive(msg: impl Into<String>) -> Self {
        SaveSyncError::Archive(msg.into())
    }

    /// Create a remote error with a custom message
    pub fn remote(msg: impl Into<String>) -> Self {
        SaveSyncError::Remote(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SaveSyncError::Internal(msg.into())
    }

    /// Errors that reject an operation before it mutates anything
    pub fn is_operation_level(&self) -> bool {
        matches!(
            self,
            SaveSyncError::InvalidName { .. }
                | SaveSyncError::DuplicateName(_)
                | SaveSyncError::NotFound(_)
                | SaveSyncError::SourceNotFound(_)
                | SaveSyncError::PathInvalid { .. }
                | SaveSyncError::SnapshotRequired { .. }
        )
    }

    /// Errors that leave the tool unusable until the user intervenes
    pub fn is_fatal(&self) -> bool {
        matches!(self, SaveSyncError::Config(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SaveSyncError::InvalidName { name, reason } => {
                format!(
                    "'{}' cannot be used as a backup name ({}). Avoid the characters < > : \" / \\ | ? *",
                    name, reason
                )
            }
            SaveSyncError::NotFound(name) => {
                format!("No backup named '{}'. Use 'list' to see available backups.", name)
            }
            SaveSyncError::SourceNotFound(path) => {
                format!(
                    "Save folder {:?} does not exist. Check the path or pass a new one.",
                    path
                )
            }
            SaveSyncError::SnapshotRequired { subject, reason } => {
                format!(
                    "Could not take a safety copy of {:?} ({}). Nothing was changed; re-run with --yes to continue without it.",
                    subject, reason
                )
            }
            SaveSyncError::Config(msg) => {
                format!(
                    "Configuration problem: {}. Fix or remove the file, or import a previously exported catalog.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SaveSyncError::NotFound("zelda".to_string());
        assert_eq!(err.to_string(), "Backup not found: zelda");

        let err = SaveSyncError::DuplicateName("zelda".to_string());
        assert_eq!(err.to_string(), "A backup named 'zelda' already exists");
    }

    #[test]
    fn test_operation_level() {
        assert!(SaveSyncError::NotFound("x".into()).is_operation_level());
        assert!(SaveSyncError::invalid_name("a?b", "forbidden character").is_operation_level());
        assert!(!SaveSyncError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "test"
        ))
        .is_operation_level());
    }

    #[test]
    fn test_fatal() {
        assert!(SaveSyncError::config("catalog.json is not valid JSON").is_fatal());
        assert!(!SaveSyncError::remote("timeout").is_fatal());
    }

    #[test]
    fn test_user_message_mentions_list() {
        let msg = SaveSyncError::NotFound("foo".into()).user_message();
        assert!(msg.contains("list"));
    }
}
