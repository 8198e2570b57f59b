//! [`ProxyBackend`] implementations.

use async_trait::async_trait;
use lessproxy_core::{CoreError, ProxyBackend, ProxyConfig, DEFAULT_PAC};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::pac_slot::PacSlot;
use crate::setup::{disable_system_proxy, enable_auto_proxy, SetupResult};

/// Path the local server serves the active script on.
pub const PAC_PATH: &str = "/proxy.pac";

/// Drives the OS proxy settings.
///
/// Smart mode publishes the script to the [`PacSlot`] and points the OS at
/// `pac_url`. Direct mode turns the system proxy off.
#[derive(Debug, Clone)]
pub struct SystemProxyBackend {
    pac_slot: PacSlot,
    pac_url: String,
}

impl SystemProxyBackend {
    /// Creates a backend that advertises `pac_url` to the OS.
    pub fn new(pac_slot: PacSlot, pac_url: impl Into<String>) -> Self {
        Self {
            pac_slot,
            pac_url: pac_url.into(),
        }
    }

    /// Builds the PAC URL for a server listening on `host:port`.
    pub fn local_pac_url(host: &str, port: u16) -> String {
        format!("http://{}:{}{}", host, port, PAC_PATH)
    }

    /// The PAC URL the OS should load for `revision`.
    pub fn revisioned_url(&self, revision: u64) -> String {
        let separator = if self.pac_url.contains('?') { '&' } else { '?' };
        format!("{}{}rev={}", self.pac_url, separator, revision)
    }

    async fn run_setup<F>(&self, op: F) -> Result<String, ProxyError>
    where
        F: FnOnce() -> SetupResult + Send + 'static,
    {
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| ProxyError::Task(e.to_string()))?
            .into_result()
    }
}

#[async_trait]
impl ProxyBackend for SystemProxyBackend {
    async fn apply(&self, config: &ProxyConfig) -> lessproxy_core::Result<()> {
        let message = match config {
            ProxyConfig::Direct => {
                self.pac_slot.set(DEFAULT_PAC);
                self.run_setup(disable_system_proxy).await
            }
            ProxyConfig::PacScript { data } => {
                let revision = self.pac_slot.set(data.as_str());
                let url = self.revisioned_url(revision);
                self.run_setup(move || enable_auto_proxy(&url)).await
            }
        }
        .map_err(|e| {
            warn!(error = %e, "System proxy change failed");
            CoreError::from(e)
        })?;

        info!("{}", message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Publishes scripts to the [`PacSlot`] without touching OS settings.
///
/// Used with `--dry-run` and in tests.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    pac_slot: PacSlot,
    current: RwLock<Option<ProxyConfig>>,
}

impl DryRunBackend {
    /// Creates a backend publishing to `pac_slot`.
    pub fn new(pac_slot: PacSlot) -> Self {
        Self {
            pac_slot,
            current: RwLock::new(None),
        }
    }

    /// The last applied configuration.
    pub fn current(&self) -> Option<ProxyConfig> {
        self.current.read().clone()
    }
}

#[async_trait]
impl ProxyBackend for DryRunBackend {
    async fn apply(&self, config: &ProxyConfig) -> lessproxy_core::Result<()> {
        match config {
            ProxyConfig::Direct => {
                self.pac_slot.set(DEFAULT_PAC);
            }
            ProxyConfig::PacScript { data } => {
                self.pac_slot.set(data.as_str());
            }
        }

        debug!(mode = %config.mode(), "Dry run: system proxy left unchanged");
        *self.current.write() = Some(config.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessproxy_core::ProxyMode;

    #[test]
    fn test_local_pac_url() {
        assert_eq!(
            SystemProxyBackend::local_pac_url("127.0.0.1", 8765),
            "http://127.0.0.1:8765/proxy.pac"
        );
    }

    #[test]
    fn test_revisioned_url() {
        let backend = SystemProxyBackend::new(PacSlot::new(), "http://127.0.0.1:8765/proxy.pac");
        assert_eq!(
            backend.revisioned_url(4),
            "http://127.0.0.1:8765/proxy.pac?rev=4"
        );

        let backend = SystemProxyBackend::new(PacSlot::new(), "http://h/pac?profile=a");
        assert_eq!(backend.revisioned_url(1), "http://h/pac?profile=a&rev=1");
    }

    #[tokio::test]
    async fn test_dry_run_publishes_script() {
        let slot = PacSlot::new();
        let backend = DryRunBackend::new(slot.clone());
        let script = "function FindProxyForURL(url, host) { return \"PROXY p:1\"; }";

        backend
            .apply(&ProxyConfig::PacScript {
                data: script.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(slot.script(), script);
        assert_eq!(slot.revision(), 1);
        assert_eq!(backend.current().unwrap().mode(), ProxyMode::Smart);
    }

    #[tokio::test]
    async fn test_dry_run_direct_serves_default_script() {
        let slot = PacSlot::new();
        let backend = DryRunBackend::new(slot.clone());
        slot.set("custom");

        backend.apply(&ProxyConfig::Direct).await.unwrap();

        assert_eq!(slot.script(), DEFAULT_PAC);
        assert_eq!(backend.current(), Some(ProxyConfig::Direct));
        assert_eq!(backend.name(), "dry-run");
    }
}
