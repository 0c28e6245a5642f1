use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request body is not a JSON object: {0}")]
    InvalidBody(String),

    #[error("missing required field: session_id")]
    MissingSessionId,

    #[error("missing required field: thread_id (required together with parent_id)")]
    MissingThreadId,

    #[error("dashboard page failed to render: {0}")]
    Render(#[from] minijinja::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidBody(_) => "invalid_body",
            ApiError::MissingSessionId => "missing_session_id",
            ApiError::MissingThreadId => "missing_thread_id",
            ApiError::Render(_) => "render_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(event = "request_failed", reason = self.code(), error = %self);
        } else {
            warn!(event = "ingest_rejected", reason = self.code(), error = %self);
        }
        let body = ErrorResponse::with_details(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
