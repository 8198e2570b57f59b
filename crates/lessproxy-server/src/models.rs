//! API request and response models.

use lessproxy_core::{Reply, Settings, StatusSnapshot};
use serde::{Deserialize, Serialize};

/// Response body for POST /api/message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Always true; failures use an error status code.
    pub ok: bool,
    /// Present for settings replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    /// Present for status replies that have a snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSnapshot>,
}

impl From<Reply> for MessageResponse {
    fn from(reply: Reply) -> Self {
        let (settings, status) = match reply {
            Reply::Ack => (None, None),
            Reply::Settings(settings) => (Some(settings), None),
            Reply::Status(status) => (None, status),
        };

        Self {
            ok: true,
            settings,
            status,
        }
    }
}

/// Response body for GET /api/status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// The last broadcast snapshot, null before the first check.
    pub status: Option<StatusSnapshot>,
}
