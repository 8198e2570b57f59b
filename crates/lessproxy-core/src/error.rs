//! Core error types.

use thiserror::Error;

/// Errors raised by the controller and its host collaborators.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A proxy mode string was neither `direct` nor `smart`.
    #[error("invalid proxy mode: {0}")]
    InvalidMode(String),

    /// A settings update was rejected.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The settings store failed.
    #[error("settings store error: {0}")]
    Store(String),

    /// The remote PAC script could not be loaded.
    #[error("failed to fetch proxy configuration: {0}")]
    Fetch(String),

    /// The connectivity check failed.
    #[error("status check failed: {0}")]
    Status(String),

    /// The proxy backend refused the configuration.
    #[error("proxy backend error: {0}")]
    Backend(String),

    /// The controller answered with a reply of the wrong kind.
    #[error("unexpected controller reply: {0}")]
    UnexpectedReply(String),

    /// The controller task has stopped.
    #[error("controller is not running")]
    ControllerClosed,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
