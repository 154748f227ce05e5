use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::classifier::Predictions;
use crate::handlers::error::{api_error, classifier_error, no_active_session, stream_error, ApiError};
use crate::state::ServerState;
use crate::streaming::{Snapshot, StartRequest};

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub ok: bool,
    /// Session that was stopped, absent when nothing was running
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlushResponse {
    pub status: String,
    pub result: Predictions,
}

#[derive(Debug, Deserialize)]
pub struct TraceQuery {
    /// Trailing window in seconds; the whole recording when absent
    pub seconds: Option<f64>,
}

/// Start a monitoring session
pub async fn start_session(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    info!(
        "Start requested by {} for {} #{}",
        request.user_id, request.dataset, request.study_number
    );
    let session_id = state.sessions.start(&request).await.map_err(stream_error)?;
    Ok(Json(StartResponse {
        session_id,
        ok: true,
    }))
}

/// Stop the running session, if any
pub async fn stop_session(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<StopResponse>, ApiError> {
    let session_id = state.sessions.stop().await.map_err(stream_error)?;
    Ok(Json(StopResponse {
        ok: true,
        session_id,
    }))
}

/// Run one classifier round trip on demand
pub async fn flush_session(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<FlushResponse>, ApiError> {
    let session = state.sessions.active().ok_or_else(no_active_session)?;
    let result = session.flusher.flush_once().await.map_err(classifier_error)?;
    Ok(Json(FlushResponse {
        status: "ok".to_string(),
        result,
    }))
}

/// Raw full-retention trace of the running session
pub async fn get_trace(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<TraceQuery>,
) -> Result<Json<Snapshot>, ApiError> {
    let session = state.sessions.active().ok_or_else(no_active_session)?;
    let snapshot = match query.seconds {
        Some(seconds) if !(seconds.is_finite() && seconds > 0.0) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                "seconds must be a positive number",
            ));
        }
        Some(seconds) => session.coordinator.trace(seconds),
        None => session.coordinator.buffers().full.snapshot(),
    };
    Ok(Json(snapshot))
}
