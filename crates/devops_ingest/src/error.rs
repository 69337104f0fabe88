//! Connector-level errors.

use thiserror::Error;

use crate::gateway::RemoteRequestError;

/// Errors raised by connector operations (as opposed to in-stream failures).
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No usable credentials have been loaded.
    #[error("Missing credentials: {0}")]
    MissingCredential(String),

    /// The token was rejected outright (401).
    #[error("Authentication failed: {message}")]
    CredentialExpired { message: String },

    /// The token is valid but lacks the scopes for this organization (403).
    #[error("Insufficient permissions: {message}")]
    InsufficientPermissions { message: String },

    /// The organization or project does not exist or is not visible.
    #[error("Project not found: {message}")]
    ProjectNotFound { message: String },

    /// Any other settings validation failure.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// A persisted checkpoint could not be accepted.
    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Remote(#[from] RemoteRequestError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Whether retrying the same call later could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::Remote(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;
