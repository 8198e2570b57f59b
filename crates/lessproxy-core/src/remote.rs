//! HTTP implementations of [`PacFetcher`] and [`StatusProbe`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::pac::{cache_busted_url, PacFetcher};
use crate::status::{IpInfo, StatusProbe, DEFAULT_STATUS_URL};

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// reqwest-backed remote access.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    status_url: String,
}

impl HttpRemote {
    /// Creates a client using the default status endpoint and timeout.
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_STATUS_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom status endpoint and timeout.
    pub fn with_options(status_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lessproxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Fetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            status_url: status_url.into(),
        })
    }

    /// The configured status endpoint.
    pub fn status_url(&self) -> &str {
        &self.status_url
    }
}

#[async_trait]
impl PacFetcher for HttpRemote {
    async fn fetch_pac(&self, url: &str) -> Result<String> {
        let target = cache_busted_url(url, Utc::now());
        debug!(url = %target, "Fetching PAC script");

        let response = self
            .client
            .get(&target)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Fetch(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| CoreError::Fetch(e.to_string()))
    }
}

#[async_trait]
impl StatusProbe for HttpRemote {
    async fn probe(&self) -> Result<IpInfo> {
        debug!(url = %self.status_url, "Checking connectivity");

        let info: IpInfo = self
            .client
            .get(&self.status_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Status(e.to_string()))?
            .json()
            .await
            .map_err(|e| CoreError::Status(e.to_string()))?;

        if info.is_failure() {
            return Err(CoreError::Status(
                info.message.unwrap_or_else(|| "lookup failed".to_string()),
            ));
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client() {
        let remote = HttpRemote::new().unwrap();
        assert_eq!(remote.status_url(), DEFAULT_STATUS_URL);
    }

    #[test]
    fn test_custom_status_url() {
        let remote =
            HttpRemote::with_options("http://127.0.0.1:9/json", Duration::from_secs(1)).unwrap();
        assert_eq!(remote.status_url(), "http://127.0.0.1:9/json");
    }

    #[tokio::test]
    async fn test_unreachable_pac_is_fetch_error() {
        let remote =
            HttpRemote::with_options("http://127.0.0.1:9/json", Duration::from_secs(2)).unwrap();
        let result = remote.fetch_pac("http://127.0.0.1:9/pac.js").await;
        assert!(matches!(result, Err(CoreError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_unreachable_status_is_status_error() {
        let remote =
            HttpRemote::with_options("http://127.0.0.1:9/json", Duration::from_secs(2)).unwrap();
        assert!(matches!(remote.probe().await, Err(CoreError::Status(_))));
    }
}
