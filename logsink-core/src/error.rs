//! Typed error handling for the log sink.
//!
//! Only directory creation and the final append can fail a `save`; every
//! other failure (rotation, retention, store insert) is reported through an
//! outcome value instead of an error.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sink operations.
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O error when creating directories or appending to a log file
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Structured encoding failed
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// The record store rejected an insert
    #[error("Store error on table {table}: {message}")]
    Store { table: String, message: String },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl SinkError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a store error.
    pub fn store(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::encode(err.to_string())
    }
}

/// Convenience type alias for sink results.
pub type SinkResult<T> = Result<T, SinkError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> SinkResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> SinkResult<T> {
        self.map_err(|e| SinkError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_path() {
        let err = SinkError::io(
            PathBuf::from("/var/log/app/20240101.log"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SinkError::Io { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/var/log/app/20240101.log")));
        assert!(err.to_string().contains("20240101.log"));
    }

    #[test]
    fn test_store_error_display() {
        let err = SinkError::store("log", "connection refused");
        assert_eq!(err.to_string(), "Store error on table log: connection refused");
        assert!(err.path().is_none());
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let sink_result = result.with_path("/missing/dir");
        assert!(matches!(sink_result, Err(SinkError::Io { .. })));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
        let err: SinkError = json_err.into();
        assert!(matches!(err, SinkError::Encode { .. }));
    }
}
