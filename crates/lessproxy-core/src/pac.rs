//! PAC script cache and loading.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};

/// Built-in script that routes everything directly.
pub const DEFAULT_PAC: &str = r#"function FindProxyForURL(url, host) { return "DIRECT"; }"#;

/// The script the controller hands to the backend in smart mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PacScript {
    /// The built-in direct stub.
    #[default]
    Default,

    /// Text fetched from a remote URL, passed through unmodified.
    Remote {
        source: String,
        url: String,
        fetched_at: DateTime<Utc>,
    },
}

impl PacScript {
    /// Returns the script source.
    pub fn source(&self) -> &str {
        match self {
            Self::Default => DEFAULT_PAC,
            Self::Remote { source, .. } => source,
        }
    }

    /// Returns true for the built-in stub.
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Where the script came from, if remote.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Remote { url, .. } => Some(url),
        }
    }
}

/// Host-provided HTTP GET for PAC scripts.
#[async_trait]
pub trait PacFetcher: Send + Sync {
    /// Fetches the body at `url` as text.
    async fn fetch_pac(&self, url: &str) -> Result<String>;
}

/// Appends a `now` query parameter so intermediaries never serve a stale script.
pub fn cache_busted_url(url: &str, now: DateTime<Utc>) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}now={}", url, separator, now.timestamp_millis())
}

/// Fetches a script from `url`.
///
/// An empty body is treated as a failed fetch.
pub async fn load_pac(fetcher: &dyn PacFetcher, url: &str) -> Result<PacScript> {
    let source = fetcher.fetch_pac(url).await?;

    if source.trim().is_empty() {
        return Err(CoreError::Fetch(format!("empty PAC script from {}", url)));
    }

    Ok(PacScript::Remote {
        source,
        url: url.to_string(),
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FixedFetcher(Result<String>);

    #[async_trait]
    impl PacFetcher for FixedFetcher {
        async fn fetch_pac(&self, _url: &str) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(CoreError::Fetch(e.to_string())),
            }
        }
    }

    #[test]
    fn test_default_script() {
        let pac = PacScript::default();
        assert!(pac.is_default());
        assert_eq!(pac.source(), DEFAULT_PAC);
        assert!(pac.url().is_none());
        assert!(DEFAULT_PAC.contains("DIRECT"));
    }

    #[test]
    fn test_cache_busted_url() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        assert_eq!(
            cache_busted_url("https://example.com/pac.js", now),
            "https://example.com/pac.js?now=1700000000123"
        );
        assert_eq!(
            cache_busted_url("https://example.com/pac?v=2", now),
            "https://example.com/pac?v=2&now=1700000000123"
        );
    }

    #[tokio::test]
    async fn test_load_pac_success() {
        let fetcher = FixedFetcher(Ok("function FindProxyForURL() {}".to_string()));
        let pac = load_pac(&fetcher, "http://pac.local/a.js").await.unwrap();

        assert!(!pac.is_default());
        assert_eq!(pac.source(), "function FindProxyForURL() {}");
        assert_eq!(pac.url(), Some("http://pac.local/a.js"));
    }

    #[tokio::test]
    async fn test_load_pac_empty_body_fails() {
        let fetcher = FixedFetcher(Ok("  \n".to_string()));
        let result = load_pac(&fetcher, "http://pac.local/a.js").await;
        assert!(matches!(result, Err(CoreError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_load_pac_propagates_error() {
        let fetcher = FixedFetcher(Err(CoreError::Fetch("timeout".to_string())));
        let result = load_pac(&fetcher, "http://pac.local/a.js").await;
        assert!(matches!(result, Err(CoreError::Fetch(msg)) if msg.contains("timeout")));
    }
}
