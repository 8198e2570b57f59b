//! API route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, Stream};
use lessproxy_core::{Message, Settings, SettingsPatch};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{MessageResponse, StatusResponse};
use crate::state::AppState;

/// MIME type browsers and OSes expect for PAC files.
pub const PAC_CONTENT_TYPE: &str = "application/x-ns-proxy-autoconfig";

/// POST /api/message - Forward a panel message to the controller.
pub async fn post_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Message>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(message) = payload?;
    debug!(?message, "Panel message");

    let reply = state.controller.send(message).await?;
    Ok(Json(reply.into()))
}

/// GET /api/settings - Read the stored settings.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>> {
    Ok(Json(state.controller.settings().await?))
}

/// PUT /api/settings - Save settings panel edits.
pub async fn put_settings(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<Settings>> {
    let Json(patch) = payload?;
    Ok(Json(state.controller.update_settings(patch).await?))
}

/// GET /api/status - The last broadcast snapshot.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.controller.last_status(),
    })
}

/// GET /api/events - Stream every broadcast as server-sent events.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let rx = state.controller.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(broadcast) => {
                    let event = Event::default().event(broadcast.kind()).json_data(&broadcast);
                    return Some((event, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /proxy.pac - The script the OS evaluates in smart mode.
pub async fn proxy_pac(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, PAC_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        state.pac_slot.script(),
    )
}
