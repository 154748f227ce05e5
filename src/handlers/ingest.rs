use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handlers::error::{api_error, no_active_session, stream_error, ApiError};
use crate::state::ServerState;
use crate::streaming::Channel;

/// One sample pushed over HTTP instead of a serial line
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source: String,
    /// Seconds since session start; the session clock is used when absent
    pub time: Option<f64>,
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    /// False when the durability queue was full and the point was dropped
    pub queued: bool,
}

pub async fn ingest_sample(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let channel: Channel = request.source.parse().map_err(stream_error)?;
    if !request.value.is_finite() || request.time.is_some_and(|t| !t.is_finite()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "time and value must be finite numbers",
        ));
    }

    let session = state.sessions.active().ok_or_else(no_active_session)?;
    let coordinator = &session.coordinator;
    let time = request.time.unwrap_or_else(|| coordinator.elapsed());
    let queued = coordinator.enqueue(channel, time, request.value);

    Ok(Json(IngestResponse { ok: true, queued }))
}
