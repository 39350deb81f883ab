//! Common error types for spbridge.

use thiserror::Error;

/// Top-level error type for spbridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration fields are absent or empty.
    #[error("Missing required configuration fields: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    /// Configuration is present but malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Identity provider rejected the credentials or no token is available.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport failure or unexpected HTTP status.
    #[error("Network error: {0}")]
    Network(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Access denied by the remote service.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether this error reports a missing remote resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_lists_every_field() {
        let err = Error::MissingConfig(vec!["tenant_id".to_string(), "blob_container".to_string()]);
        assert_eq!(
            err.to_string(),
            "Missing required configuration fields: tenant_id, blob_container"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("container".to_string()).is_not_found());
        assert!(!Error::Network("timeout".to_string()).is_not_found());
    }
}
