//! Error types for deploy commander

use thiserror::Error;

/// Main error type for deployments
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Required transport fields are missing; no network call was made
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connection, timeout, non-2xx or non-zero exit; carries the raw remote output
    #[error("Transport error: {message}")]
    TransportError { message: String, output: String },

    /// The remote side answered but reported a failed script or command
    #[error("Remote execution error: {0}")]
    RemoteExecutionError(String),

    #[error("Upload error: {0}")]
    UploadError(String),

    /// Archive construction failed before any network call
    #[error("Build error: {0}")]
    LocalBuildError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("No matching server found")]
    NoMatchingServer,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DeployError {
    pub fn transport(message: impl Into<String>, output: impl Into<String>) -> Self {
        DeployError::TransportError {
            message: message.into(),
            output: output.into(),
        }
    }
}

impl From<beacon_protocol::ProtocolError> for DeployError {
    fn from(err: beacon_protocol::ProtocolError) -> Self {
        DeployError::RemoteExecutionError(err.to_string())
    }
}

impl From<dialoguer::Error> for DeployError {
    fn from(err: dialoguer::Error) -> Self {
        DeployError::PromptError(err.to_string())
    }
}

