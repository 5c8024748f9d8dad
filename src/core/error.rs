//! Guard error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the authorization core
#[derive(Error, Debug)]
pub enum GuardError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A policy or grant file could not be written
    #[error("Failed to write {path}: {source}")]
    ConfigWrite {
        /// File that was being written
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// The command analyzer could not classify a command
    #[error("Command analysis failed: {0}")]
    AnalysisFailed(String),

    /// The command analyzer did not answer in time
    #[error("Command analysis timed out after {0:?}")]
    AnalysisTimeout(Duration),

    /// A confirmation was resolved more than once
    #[error("Confirmation already resolved")]
    AlreadyResolved,

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    ChannelClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl GuardError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        GuardError::Other(msg.into())
    }

    /// Wrap an IO failure that happened while writing `path`
    pub fn config_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GuardError::ConfigWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether this error represents cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GuardError::Cancelled)
    }
}

/// Result type alias for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuardError::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");

        let err = GuardError::AnalysisTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Command analysis timed out after 10s");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let guard_err: GuardError = io_err.into();
        assert!(matches!(guard_err, GuardError::Io(_)));
        assert!(!guard_err.is_cancelled());
    }

    #[test]
    fn test_config_write_names_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = GuardError::config_write("/tmp/x/permissions.json", io_err);
        assert!(err.to_string().contains("/tmp/x/permissions.json"));
    }
}
