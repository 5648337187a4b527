//! `POST /sessions/{sessionId}/push`: hand a proactive message to the
//! dispatcher on behalf of an upstream trigger source.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use metrics::counter;
use nudge_core::{PushMessage, PushOutcome, SessionId};
use serde::Serialize;

use crate::error::ApiError;
use crate::metrics::TRIGGER_REJECTED_TOTAL;
use crate::server::AppState;

/// Response body of a push request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PushResponse {
    /// `delivered`, `queued` or `dropped`.
    pub outcome: &'static str,
    /// Why a dropped push was dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<PushOutcome> for PushResponse {
    fn from(outcome: PushOutcome) -> Self {
        let reason = match outcome {
            PushOutcome::Dropped(reason) => Some(reason.as_str()),
            PushOutcome::Delivered | PushOutcome::Queued => None,
        };
        Self {
            outcome: outcome.as_str(),
            reason,
        }
    }
}

/// POST /sessions/{session_id}/push
pub async fn push_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<PushMessage>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let (session_id, message) = validate(session_id, body).inspect_err(|err| {
        counter!(TRIGGER_REJECTED_TOTAL, "code" => err.code()).increment(1);
    })?;
    let outcome = state.dispatcher.push(&session_id, message);
    Ok(Json(outcome.into()))
}

fn validate(
    session_id: String,
    body: Result<Json<PushMessage>, JsonRejection>,
) -> Result<(SessionId, PushMessage), ApiError> {
    let session_id = SessionId::parse(session_id)?;
    let Json(message) = body.map_err(|rejection| ApiError::InvalidMessage(rejection.body_text()))?;
    if message.content.trim().is_empty() {
        return Err(ApiError::InvalidMessage("content is empty".into()));
    }
    Ok((session_id, message))
}
