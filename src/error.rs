//! Error types for Listago.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Recovery hints for the CLI
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Every repository, exporter and importer operation returns [`Result`].
//! "Nothing matched" is an `Ok(0)`, never an error.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Listago operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotConnected,
    DatabaseError,

    // Not Found (exit 3)
    ListNotFound,
    ListitemNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidState,

    // Transfer (exit 6)
    UnsupportedRevision,
    InvalidArchive,
    ArchiveError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ListNotFound => "LIST_NOT_FOUND",
            Self::ListitemNotFound => "LISTITEM_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidState => "INVALID_STATE",
            Self::UnsupportedRevision => "UNSUPPORTED_REVISION",
            Self::InvalidArchive => "INVALID_ARCHIVE",
            Self::ArchiveError => "ARCHIVE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotConnected | Self::DatabaseError => 2,
            Self::ListNotFound | Self::ListitemNotFound => 3,
            Self::InvalidArgument | Self::InvalidState => 4,
            Self::UnsupportedRevision | Self::InvalidArchive | Self::ArchiveError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// True for connection-level failures (the guard reopens on the next
    /// call) and for wrong-state calls that can be repeated after the
    /// missing step.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::DatabaseError | Self::InvalidState | Self::InvalidArgument
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Listago operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No database connection available: {path}")]
    NotConnected { path: String },

    #[error("List not found: {id}")]
    ListNotFound { id: i64 },

    #[error("Listitem not found: {id}")]
    ListitemNotFound { id: i64 },

    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    #[error("Unsupported model revision '{rev}'")]
    UnsupportedRevision { rev: String },

    #[error("Invalid archive at {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConnected { .. } => ErrorCode::NotConnected,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::ListNotFound { .. } => ErrorCode::ListNotFound,
            Self::ListitemNotFound { .. } => ErrorCode::ListitemNotFound,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::UnsupportedRevision { .. } => ErrorCode::UnsupportedRevision,
            Self::InvalidArchive { .. } => ErrorCode::InvalidArchive,
            Self::Zip(_) => ErrorCode::ArchiveError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Recovery hint for the CLI.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotConnected { path } => Some(format!(
                "Could not open the database at '{path}'. Check the path (--db / LISTAGO_DB) and its permissions."
            )),
            Self::ListNotFound { id } => Some(format!(
                "No active list with ID {id}. Use `listago lists` (or `listago lists --trash`) to see available lists."
            )),
            Self::UnsupportedRevision { rev } => Some(format!(
                "The archive was written by a newer app version (model revision {rev}). Update Listago and retry."
            )),
            Self::InvalidArchive { .. } => Some(
                "Make sure the path points to an archive (or unpacked archive directory) created by `listago export`."
                    .to_string(),
            ),
            Self::InvalidState { expected, .. } => {
                Some(format!("Call the operation again once the component is {expected}."))
            }
            Self::ListitemNotFound { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Zip(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }

    /// Whether this error means the underlying connection is unusable and
    /// must be reopened before the next statement.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::DatabaseCorrupt
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::ListNotFound { id: 4 }.exit_code(), 3);
        assert_eq!(Error::InvalidArgument("x".into()).exit_code(), 4);
        assert_eq!(
            Error::UnsupportedRevision { rev: "7".into() }.exit_code(),
            6
        );
        assert_eq!(Error::Other("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_structured_json_has_hint() {
        let json = Error::UnsupportedRevision { rev: "2".into() }.to_structured_json();
        assert_eq!(json["error"]["code"], "UNSUPPORTED_REVISION");
        assert!(json["error"]["hint"].as_str().unwrap().contains("revision 2"));
    }

    #[test]
    fn test_structured_json_without_hint() {
        let json = Error::Other("boom".into()).to_structured_json();
        assert!(json["error"].get("hint").is_none());
        assert_eq!(json["error"]["retryable"], false);
    }
}
