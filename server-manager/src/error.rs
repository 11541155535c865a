//! Error types for the server-manager crate.

use poll_engine::FetchError;

/// Errors returned by a [`ServerClient`](crate::ServerClient).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The server could not be reached at all
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code returned by the server
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request did not complete in time
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The requested object does not exist on the server
    #[error("Object not found: {0}")]
    NotFound(String),
}

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unreachable(msg) => FetchError::Network(msg),
            ClientError::Http { .. } | ClientError::NotFound(_) => FetchError::Network(err.to_string()),
            ClientError::Decode(msg) => FetchError::Decode(msg),
            ClientError::Timeout(after) => FetchError::Timeout(format!("{:?}", after)),
        }
    }
}

/// Errors from server manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A server with this ID is already registered
    #[error("Server already exists: {0}")]
    DuplicateServer(String),

    /// The server configuration has no URL
    #[error("Server {0} has an empty URL")]
    EmptyUrl(String),

    /// No server with this ID is registered
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// A remote call failed
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Not every instance stopped before the shutdown deadline
    #[error("Shutdown deadline exceeded with {pending} instance(s) still stopping")]
    ShutdownTimeout {
        /// Number of instances that had not finished stopping
        pending: usize,
    },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<poll_engine::PollError> for ManagerError {
    fn from(err: poll_engine::PollError) -> Self {
        ManagerError::Configuration(err.to_string())
    }
}

/// Convenience type alias for Results using ManagerError.
pub type Result<T> = std::result::Result<T, ManagerError>;
