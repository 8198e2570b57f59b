//! Connectivity snapshots and the broadcast channel the panels listen on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::mode::ProxyMode;

/// Default IP lookup endpoint.
pub const DEFAULT_STATUS_URL: &str = "http://ip-api.com/json";

/// Shown when the PAC script could not be loaded.
pub const FETCH_FAILED_MESSAGE: &str =
    "Failed to load proxy configuration, check your network or proxy settings";

/// Shown when the connectivity check failed.
pub const CHECK_FAILED_MESSAGE: &str =
    "Connectivity check failed, check your network or proxy settings";

const BROADCAST_CAPACITY: usize = 64;

/// Egress information returned by the lookup endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IpInfo {
    /// `success` or `fail`.
    #[serde(default)]
    pub status: Option<String>,
    /// Failure reason when `status` is `fail`.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "query")]
    pub ip: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, rename = "as")]
    pub as_info: Option<String>,
}

impl IpInfo {
    /// Returns true if the endpoint reported a failed lookup.
    pub fn is_failure(&self) -> bool {
        self.status.as_deref() == Some("fail")
    }
}

/// Host-provided connectivity check.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Looks up the current egress address.
    async fn probe(&self) -> Result<IpInfo>;
}

/// A point-in-time view of connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub ip: Option<String>,
    pub isp: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub as_info: Option<String>,
    /// True while the built-in direct script is in effect.
    pub is_using_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Builds a snapshot from a successful lookup.
    pub fn from_info(info: IpInfo, is_using_default: bool) -> Self {
        Self {
            ip: info.ip,
            isp: info.isp,
            country: info.country,
            city: info.city,
            timezone: info.timezone,
            as_info: info.as_info,
            is_using_default,
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Builds an error snapshot.
    pub fn failure(message: impl Into<String>, is_using_default: bool) -> Self {
        Self {
            ip: None,
            isp: None,
            country: None,
            city: None,
            timezone: None,
            as_info: None,
            is_using_default,
            error: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    /// Returns true if this snapshot reports an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Messages broadcast to every listening panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Broadcast {
    /// The routing mode changed.
    ModeChange { mode: ProxyMode },

    /// A new connectivity snapshot is available.
    ProxyStatusUpdate { payload: StatusSnapshot },
}

impl Broadcast {
    /// Event name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModeChange { .. } => "MODE_CHANGE",
            Self::ProxyStatusUpdate { .. } => "PROXY_STATUS_UPDATE",
        }
    }
}

/// Fans broadcasts out to subscribers and remembers the last status.
///
/// Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: broadcast::Sender<Broadcast>,
    last_status: Arc<RwLock<Option<StatusSnapshot>>>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    /// Creates a reporter with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            last_status: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribes to future broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// The last status broadcast, if any.
    pub fn last_status(&self) -> Option<StatusSnapshot> {
        self.last_status.read().clone()
    }

    /// Broadcasts a mode change.
    pub fn mode_changed(&self, mode: ProxyMode) {
        self.send(Broadcast::ModeChange { mode });
    }

    /// Records and broadcasts a status snapshot.
    pub fn status(&self, snapshot: StatusSnapshot) {
        *self.last_status.write() = Some(snapshot.clone());
        self.send(Broadcast::ProxyStatusUpdate { payload: snapshot });
    }

    fn send(&self, message: Broadcast) {
        // No listeners is normal when no panel is open.
        if self.tx.send(message).is_err() {
            tracing::trace!("No panels listening for broadcasts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_info() -> IpInfo {
        serde_json::from_value(json!({
            "status": "success",
            "country": "Japan",
            "city": "Tokyo",
            "timezone": "Asia/Tokyo",
            "isp": "Example ISP",
            "as": "AS64500 Example",
            "query": "203.0.113.7"
        }))
        .unwrap()
    }

    #[test]
    fn test_ip_info_field_mapping() {
        let info = sample_info();
        assert_eq!(info.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.as_info.as_deref(), Some("AS64500 Example"));
        assert!(!info.is_failure());

        let failed: IpInfo =
            serde_json::from_value(json!({"status": "fail", "message": "reserved range"}))
                .unwrap();
        assert!(failed.is_failure());
        assert!(failed.ip.is_none());
    }

    #[test]
    fn test_snapshot_from_info() {
        let snapshot = StatusSnapshot::from_info(sample_info(), true);
        assert_eq!(snapshot.city.as_deref(), Some("Tokyo"));
        assert!(snapshot.is_using_default);
        assert!(!snapshot.is_error());
    }

    #[test]
    fn test_broadcast_wire_format() {
        let json = serde_json::to_value(Broadcast::ModeChange {
            mode: ProxyMode::Smart,
        })
        .unwrap();
        assert_eq!(json, json!({"type": "MODE_CHANGE", "mode": "smart"}));

        let message = Broadcast::ProxyStatusUpdate {
            payload: StatusSnapshot::failure("boom", false),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "PROXY_STATUS_UPDATE");
        assert_eq!(json["payload"]["error"], "boom");
        assert_eq!(message.kind(), "PROXY_STATUS_UPDATE");
    }

    #[test]
    fn test_error_field_omitted_on_success() {
        let json = serde_json::to_value(StatusSnapshot::from_info(sample_info(), false)).unwrap();
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_reporter_fans_out_and_remembers() {
        let reporter = StatusReporter::new();
        let mut rx1 = reporter.subscribe();
        let mut rx2 = reporter.clone().subscribe();
        assert_eq!(reporter.subscriber_count(), 2);
        assert!(reporter.last_status().is_none());

        reporter.mode_changed(ProxyMode::Direct);
        reporter.status(StatusSnapshot::failure("offline", true));

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.recv().await.unwrap(),
                Broadcast::ModeChange {
                    mode: ProxyMode::Direct
                }
            );
            assert!(matches!(
                rx.recv().await.unwrap(),
                Broadcast::ProxyStatusUpdate { .. }
            ));
        }

        let last = reporter.last_status().unwrap();
        assert_eq!(last.error.as_deref(), Some("offline"));
    }

    #[test]
    fn test_reporter_without_subscribers() {
        let reporter = StatusReporter::new();
        reporter.mode_changed(ProxyMode::Smart);
        reporter.status(StatusSnapshot::failure("x", false));
        assert!(reporter.last_status().is_some());
    }
}
