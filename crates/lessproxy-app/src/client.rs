//! HTTP client used by the panel commands.

use std::time::Duration;

use lessproxy_core::{Broadcast, Message, Settings, SettingsPatch, StatusSnapshot};
use lessproxy_server::{ErrorResponse, MessageResponse, StatusResponse};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Timeout for request/response calls. Not applied to `watch`.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from talking to the background service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing is listening at the configured address.
    #[error("LessProxy is not running at {0} (start it with `lessproxy serve`)")]
    NotRunning(String),

    /// The service answered with an error.
    #[error("{message} ({code})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Talks to `lessproxy serve` on behalf of the panels.
#[derive(Debug, Clone)]
pub struct PanelClient {
    client: reqwest::Client,
    base_url: String,
}

impl PanelClient {
    /// Creates a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("LessProxy/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The service address.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a controller message.
    pub async fn send(&self, message: &Message) -> Result<MessageResponse> {
        debug!(?message, "Sending message");
        let request = self
            .client
            .post(self.url("/api/message"))
            .timeout(REQUEST_TIMEOUT)
            .json(message);
        self.execute(request).await
    }

    /// Reads the stored settings.
    pub async fn settings(&self) -> Result<Settings> {
        let request = self
            .client
            .get(self.url("/api/settings"))
            .timeout(REQUEST_TIMEOUT);
        self.execute(request).await
    }

    /// Saves settings edits.
    pub async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let request = self
            .client
            .put(self.url("/api/settings"))
            .timeout(REQUEST_TIMEOUT)
            .json(patch);
        self.execute(request).await
    }

    /// The last broadcast status.
    pub async fn status(&self) -> Result<Option<StatusSnapshot>> {
        let request = self
            .client
            .get(self.url("/api/status"))
            .timeout(REQUEST_TIMEOUT);
        let response: StatusResponse = self.execute(request).await?;
        Ok(response.status)
    }

    /// Streams broadcasts until the service goes away.
    pub async fn watch<F>(&self, mut on_event: F) -> Result<()>
    where
        F: FnMut(Broadcast),
    {
        let response = self
            .client
            .get(self.url("/api/events"))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let mut response = check_status(response).await?;

        let mut parser = EventParser::default();
        while let Some(chunk) = response.chunk().await? {
            for broadcast in parser.push(&chunk) {
                on_event(broadcast);
            }
        }

        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn map_send_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_connect() {
            ClientError::NotRunning(self.base_url.clone())
        } else {
            ClientError::Http(err)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await?;
    let (code, message) = match serde_json::from_slice::<ErrorResponse>(&body) {
        Ok(err) => (err.code, err.error),
        Err(_) => (
            status.as_str().to_string(),
            String::from_utf8_lossy(&body).trim().to_string(),
        ),
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Incremental parser for a server-sent event stream of broadcasts.
///
/// Events end with a blank line. Comment lines (keep-alives) and events
/// without data are skipped.
#[derive(Debug, Default)]
pub struct EventParser {
    buffer: Vec<u8>,
}

impl EventParser {
    /// Feeds a chunk; returns the broadcasts it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Broadcast> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end.0 + end.1).collect();
            let text = String::from_utf8_lossy(&block[..end.0]);

            if let Some(broadcast) = parse_event(&text) {
                events.push(broadcast);
            }
        }

        events
    }
}

/// Position and length of the first blank-line separator.
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event(block: &str) -> Option<Broadcast> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(&data.join("\n")) {
        Ok(broadcast) => Some(broadcast),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed event");
            None
        }
    }
}
