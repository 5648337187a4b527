//! `GET /health`: liveness plus a snapshot of stream and session counts.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use nudge_core::{DeliveryPolicy, PushDispatcher};
use serde::Serialize;

use crate::server::AppState;

/// Health check response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once the stop signal has fired.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions with a live stream.
    pub connections: usize,
    /// Every session in the store, attached or not.
    pub known_sessions: usize,
    /// `best_effort` or `backlog`.
    pub delivery: &'static str,
}

impl HealthResponse {
    /// Snapshot the dispatcher's counters.
    pub fn snapshot(dispatcher: &PushDispatcher, start_time: Instant, shutting_down: bool) -> Self {
        let delivery = match dispatcher.policy() {
            DeliveryPolicy::BestEffort => "best_effort",
            DeliveryPolicy::Backlog { .. } => "backlog",
        };
        Self {
            status: if shutting_down { "shutting_down" } else { "ok" },
            uptime_secs: start_time.elapsed().as_secs(),
            connections: dispatcher.registry().len(),
            known_sessions: dispatcher.store().len(),
            delivery,
        }
    }
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::snapshot(
        &state.dispatcher,
        state.start_time,
        state.shutdown.is_shutting_down(),
    ))
}
