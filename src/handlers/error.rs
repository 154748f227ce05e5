use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::classifier::ClassifierError;
use crate::streaming::StreamError;

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.to_string(),
        }),
    )
}

pub fn no_active_session() -> ApiError {
    api_error(StatusCode::CONFLICT, "NO_ACTIVE_SESSION", "No active session")
}

impl From<StreamError> for ErrorResponse {
    fn from(e: StreamError) -> Self {
        Self {
            error: e.to_string(),
            code: stream_error_code(&e).to_string(),
        }
    }
}

fn stream_error_code(e: &StreamError) -> &'static str {
    match e {
        StreamError::InvalidConfig(_) => "INVALID_INPUT",
        StreamError::UnknownChannel(_) => "UNKNOWN_CHANNEL",
        StreamError::AlreadyRunning => "SESSION_RUNNING",
        StreamError::NoActiveSession => "NO_ACTIVE_SESSION",
        StreamError::Emulator(_) => "EMULATOR_ERROR",
        StreamError::Storage(_) => "STORAGE_ERROR",
        _ => "INTERNAL_ERROR",
    }
}

pub fn stream_error(e: StreamError) -> ApiError {
    let status = match &e {
        StreamError::InvalidConfig(_) | StreamError::UnknownChannel(_) => StatusCode::BAD_REQUEST,
        StreamError::AlreadyRunning | StreamError::NoActiveSession => StatusCode::CONFLICT,
        _ => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(e.into()))
}

pub fn classifier_error(e: ClassifierError) -> ApiError {
    match e {
        ClassifierError::NotConfigured => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "CLASSIFIER_NOT_CONFIGURED",
            "No classifier endpoint configured",
        ),
        ClassifierError::Export(inner) => stream_error(inner),
        other => {
            warn!("Classifier call failed: {}", other);
            api_error(StatusCode::BAD_GATEWAY, "CLASSIFIER_ERROR", other.to_string())
        }
    }
}
