//! `POST /chat`: SSE streaming chat endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use validator::Validate;

use super::orchestrator::{ChatTurnRequest, run_turn};
use crate::auth::AuthUser;
use crate::gateway::state::AppState;
use crate::gateway::types::ApiError;

/// Frames buffered between the orchestrator task and the SSE writer.
const FRAME_CHANNEL_CAP: usize = 64;

/// Streaming chat
///
/// Emits `data: <json>` frames: a `conversation_id` frame first, then
/// `content` deltas, then `done` (or a single `error`).
#[utoipa::path(
    post,
    path = "/api/v1/client/chat",
    request_body = ChatTurnRequest,
    responses(
        (status = 200, description = "SSE frame stream", content_type = "text/event-stream"),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChatTurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAP);

    // The turn runs detached: client disconnect stops frame delivery but
    // settlement and persistence always complete.
    tokio::spawn(run_turn(state, auth.user_id, req, tx));

    let stream = ReceiverStream::new(rx).map(|frame| Ok(frame.into_event()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
