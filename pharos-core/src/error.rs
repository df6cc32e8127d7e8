// Error types for the Pharos framework

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Raised at registration time for invalid handler or application
    /// configuration. Fatal: surfaced from `App::build` before the server
    /// ever accepts a connection.
    #[error("improperly configured: {0}")]
    Configuration(String),

    /// Malformed runtime input, e.g. an invalid HTTP method token.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("dependency resolution failed: {0}")]
    Dependency(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::Validation(_) | Error::Deserialization(_) => 400,
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
