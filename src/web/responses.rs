use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Plain `{ "message": ... }` payload.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Helper for handlers that need to return `(StatusCode, Json<ErrorDetail>)`.
pub fn json_error(status: StatusCode, detail: impl Into<String>) -> (StatusCode, Json<ErrorDetail>) {
    (
        status,
        Json(ErrorDetail {
            detail: detail.into(),
        }),
    )
}
