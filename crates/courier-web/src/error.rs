//! Error types for the HTTP binding.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use courier_pipeline::PipelineError;

/// Errors returned to HTTP callers as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum WebError {
    /// The request body could not be read as an upload batch.
    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),

    /// The pipeline rejected or failed the batch.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// No log file has been written yet.
    #[error("log file not found")]
    LogNotFound,

    /// The log file exists but could not be read.
    #[error("failed to read logs: {0}")]
    LogRead(#[source] std::io::Error),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::Body(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Pipeline(PipelineError::StaleInstant { .. }) => StatusCode::BAD_REQUEST,
            Self::Pipeline(e) if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::LogNotFound => StatusCode::NOT_FOUND,
            Self::LogRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Pipeline(e @ PipelineError::Persistence { .. }) => format!("Upload failed: {e}"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            error!(status = %status, detail = %detail, "request failed");
        } else {
            warn!(status = %status, detail = %detail, "request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
