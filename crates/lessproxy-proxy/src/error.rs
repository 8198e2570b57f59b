//! Error types for the proxy backends.

use lessproxy_core::CoreError;
use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The OS refused the proxy change.
    #[error("System proxy setup failed: {0}")]
    Setup(String),

    /// The change requires administrator privileges.
    #[error("Administrator privileges required: {0}")]
    NeedsAdmin(String),

    /// The blocking setup task did not finish.
    #[error("Setup task failed: {0}")]
    Task(String),
}

impl From<ProxyError> for CoreError {
    fn from(err: ProxyError) -> Self {
        CoreError::Backend(err.to_string())
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
