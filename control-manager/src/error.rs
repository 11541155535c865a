use thiserror::Error;

/// Rejections returned synchronously by the control manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// No control tokens are configured, so there is nothing to take
    #[error("Control is disabled")]
    Disabled,

    /// The token is not one of the configured control tokens
    #[error("Invalid control token")]
    InvalidToken,

    /// Another session holds control and has not expired
    #[error("Control is held by another session")]
    ControlTaken,

    /// The caller does not hold control
    #[error("Caller is not the controller")]
    NotController,
}

/// Result type for Control Manager operations
pub type Result<T> = std::result::Result<T, ControlError>;
