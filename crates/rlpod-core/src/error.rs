//! Error types for the pod runtime

use std::path::PathBuf;
use thiserror::Error;

/// Failure raised by a single connector fetch
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Reading the underlying data failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data was read but could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// The fetch was aborted because a sibling failed or the caller gave up
    #[error("Fetch cancelled")]
    Cancelled,

    /// The caller-supplied deadline elapsed
    #[error("Fetch timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Core error type for pod operations
#[derive(Error, Debug)]
pub enum PodError {
    /// Invalid manifest content; never auto-corrected
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The manifest could not be read for hashing
    #[error("Failed to compute hash for manifest '{}': {source}", path.display())]
    Hash {
        /// Manifest path
        path: PathBuf,
        /// Underlying read failure
        #[source]
        source: std::io::Error,
    },

    /// A data source's fetch failed; no partial table was cached
    #[error("Connector error for source '{source_name}': {error}")]
    Connector {
        /// Source path, or the comma-separated pending sources on timeout
        source_name: String,
        /// Underlying connector failure
        #[source]
        error: ConnectorError,
    },

    /// Registry lookup miss, or a missing manifest
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied state rows could not be read
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Manifest tree could not be parsed or edited
    #[error("Manifest error: {0}")]
    Manifest(#[source] rlpod_spec::SpecError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PodError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether re-running the failed operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connector { .. })
    }
}

impl From<rlpod_spec::SpecError> for PodError {
    fn from(err: rlpod_spec::SpecError) -> Self {
        match err {
            rlpod_spec::SpecError::MalformedRewards(_) => Self::Configuration(err.to_string()),
            other => Self::Manifest(other),
        }
    }
}

/// Result type alias for pod operations
pub type Result<T> = std::result::Result<T, PodError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rlpod_spec::SpecError;

    #[test]
    fn test_malformed_rewards_is_configuration() {
        let err = PodError::from(SpecError::MalformedRewards("sometimes".to_string()));
        assert!(matches!(err, PodError::Configuration(ref message) if message.contains("'sometimes'")));
        assert!(!err.is_retryable());

        let err = PodError::from(SpecError::NoActions);
        assert!(matches!(err, PodError::Manifest(SpecError::NoActions)));
    }
}
