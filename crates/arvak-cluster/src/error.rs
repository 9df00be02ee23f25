//! Error handling for cluster access.

use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while resolving adapters or talking to a scheduler.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Adapter configuration is missing its `adapter` discriminator.
    #[error("Adapter not specified: {0}")]
    AdapterNotSpecified(String),

    /// The `adapter` discriminator names nothing registered.
    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    /// The adapter is known but its implementation could not be loaded.
    #[error("Adapter '{adapter}' is installed but could not be loaded: {reason}")]
    AdapterLoadFailure { adapter: String, reason: String },

    /// Opening a native scheduler session returned a negative id.
    #[error("Connection to batch server failed ({code}): {message}")]
    ConnectionFailure { code: i32, message: String },

    /// The native library reported an error after a session completed.
    #[error("Batch server error ({code}): {message}")]
    NativeProtocol { code: i32, message: String },

    /// The submission binary exited unsuccessfully.
    #[error("Job submission failed: {0}")]
    SubmissionFailure(String),

    /// External scheduler command failed.
    #[error("Scheduler command failed: {command} - {message}")]
    CommandError { command: String, message: String },

    /// Job not found on the scheduler.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Malformed scheduler output.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ClusterError {
    fn from(e: tokio::task::JoinError) -> Self {
        ClusterError::Internal(format!("blocking task failed: {e}"))
    }
}

impl ClusterError {
    /// Whether this error came out of the configuration/resolution step
    /// rather than from talking to a scheduler.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ClusterError::AdapterNotSpecified(_)
                | ClusterError::AdapterNotFound(_)
                | ClusterError::AdapterLoadFailure { .. }
                | ClusterError::Config(_)
        )
    }
}
