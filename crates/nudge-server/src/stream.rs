//! `GET /stream`: one session's push frames as Server-Sent Events.
//!
//! The connection guard moves into the response stream. Whichever way the
//! stream ends (client disconnect drops it, shutdown breaks the loop) the
//! guard is released exactly once.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use nudge_core::{ConnectionGuard, Frame, SessionId};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::server::AppState;

/// Keep-alive comment text.
const KEEP_ALIVE_TEXT: &str = "keep-alive";

/// Query string of `GET /stream`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Session to attach to.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// GET /stream?sessionId=…
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = SessionId::parse(query.session_id.unwrap_or_default())?;
    let identity = state.resolver.resolve(&headers).await;

    let attachment = state
        .dispatcher
        .attach(session_id, identity, state.config.channel_capacity);
    let (rx, guard) = attachment.into_parts();
    let stream = frame_stream(rx, guard, state.shutdown.token());

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.config.keep_alive())
            .text(KEEP_ALIVE_TEXT),
    ))
}

/// Adapt a channel receiver into an SSE event stream that owns `guard`.
pub fn frame_stream(
    mut rx: mpsc::Receiver<Frame>,
    guard: ConnectionGuard,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let guard = guard;
        loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!(session_id = %guard.session_id(), "closing stream for shutdown");
                    break;
                }
                frame = rx.recv() => frame,
            };
            let Some(frame) = frame else { break };
            match to_event(&frame) {
                Ok(event) => yield Ok(event),
                Err(error) => warn!(
                    session_id = %guard.session_id(),
                    %error,
                    "failed to encode frame"
                ),
            }
        }
        let _ = guard.release();
    }
}

/// One frame as an SSE event: `event:` is the frame type, `data:` its JSON.
pub fn to_event(frame: &Frame) -> Result<Event, axum::Error> {
    Event::default().event(frame.event_name()).json_data(frame)
}
