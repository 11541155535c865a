//! Error types for the plantview facade.

use crate::logging::LoggingError;

/// Errors from starting or stopping a [`Viewer`](crate::Viewer).
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A server manager operation failed
    #[error(transparent)]
    Manager(#[from] server_manager::ManagerError),

    /// A control arbitration request was rejected
    #[error(transparent)]
    Control(#[from] control_manager::ControlError),

    /// The tracing subscriber could not be installed
    #[error(transparent)]
    Logging(#[from] LoggingError),
}

/// Convenience type alias for Results using ViewerError.
pub type Result<T> = std::result::Result<T, ViewerError>;
