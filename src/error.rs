//! Error types for flagcheck

use thiserror::Error;

/// Main error type for checker code and the harness itself.
///
/// `Broken` and `Offline` are the two signals a checker body raises on
/// purpose; every other variant is treated as a defect of the checker (not
/// the service) when the engine classifies the run.
#[derive(Error, Debug)]
pub enum CheckerError {
    /// The service responded but failed a correctness check.
    #[error("{0}")]
    Broken(String),

    /// The service could not be reached at all.
    #[error("{0}")]
    Offline(String),

    // Store errors
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    // Dispatch errors
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action not implemented: {0}")]
    NotImplemented(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for checker code and the harness.
pub type CheckerResult<T> = Result<T, CheckerError>;

impl CheckerError {
    /// Signal that the service responded but is broken (wrong flag,
    /// malformed response).
    pub fn broken(message: impl Into<String>) -> Self {
        CheckerError::Broken(message.into())
    }

    /// Signal that the service could not be reached.
    pub fn offline(message: impl Into<String>) -> Self {
        CheckerError::Offline(message.into())
    }
}

// Conversion implementations
impl From<serde_json::Error> for CheckerError {
    fn from(err: serde_json::Error) -> Self {
        CheckerError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CheckerError {
    fn from(err: reqwest::Error) -> Self {
        // Connection-level failures mean the service is unreachable;
        // everything else stays an HTTP error and classifies as a defect.
        if err.is_connect() || err.is_timeout() {
            CheckerError::Offline(format!("connection to service failed: {err}"))
        } else {
            CheckerError::Http(err.to_string())
        }
    }
}
