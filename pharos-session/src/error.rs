// Error types for session operations

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Storage backend I/O error
    #[error("storage error: {0}")]
    Storage(String),

    /// Payload codec error
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SessionError> for pharos_core::Error {
    fn from(error: SessionError) -> Self {
        pharos_core::Error::Session(error.to_string())
    }
}
