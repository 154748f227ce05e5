use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::handlers::{
    flush_session, get_trace, handle_websocket, health_check, ingest_sample, start_session,
    stop_session,
};
use crate::state::ServerState;

/// All HTTP and websocket routes, without middleware
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/start", post(start_session))
        .route("/stop", post(stop_session))
        .route("/flush", post(flush_session))
        .route("/ingest", post(ingest_sample))
        .route("/trace", get(get_trace))
        .route("/ws", get(handle_websocket))
        .with_state(state)
}

/// CORS layer from `CORS_ORIGINS`; `*` allows any origin without credentials
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(origins).allow_credentials(true)
}
