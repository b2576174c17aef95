use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sidequest_core::PipelineError;

/// Errors surfaced by the HTTP API. Every variant renders as a JSON body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            Self::Pipeline(err @ PipelineError::Stall { .. }) => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": err.to_string(),
                    "kind": err.kind(),
                    "stage": err.stage(),
                }),
            ),
            Self::Pipeline(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string(), "kind": err.kind() }),
            ),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, body = %body, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
