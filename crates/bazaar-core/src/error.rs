//! Error types for bazaar-core

use thiserror::Error;

/// Result type alias using bazaar-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bazaar-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record or queue item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required remote dependency is not available
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Remote snapshot format was not recognized
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// Transport-level failure, timeouts included
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The remote system answered but refused the request
    #[error("Remote rejected: {0}")]
    RemoteRejected(String),

    /// Mutation payload failed validation at enqueue time
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl Error {
    /// Whether a later attempt of the same remote call may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure(_) | Self::RemoteRejected(_) | Self::NotConfigured(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::NetworkFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_remote_errors_are_retryable() {
        assert!(Error::NetworkFailure("timeout".into()).is_retryable());
        assert!(Error::RemoteRejected("HTTP 503".into()).is_retryable());
        assert!(Error::NotConfigured("no sink".into()).is_retryable());
    }

    #[test]
    fn contract_errors_are_not_retryable() {
        assert!(!Error::InvalidPayload("missing id".into()).is_retryable());
        assert!(!Error::ParseFailure("bad json".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
    }
}
