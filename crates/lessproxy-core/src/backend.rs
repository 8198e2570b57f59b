//! The host's proxy-enforcement seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::mode::ProxyConfig;

/// Applies a proxy configuration to whatever enforces routing.
#[async_trait]
pub trait ProxyBackend: Send + Sync {
    /// Replaces the active configuration.
    async fn apply(&self, config: &ProxyConfig) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
