use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use archviz_comfyui::api::ComfyUIApiError;
use archviz_core::error::CoreError;
use archviz_pipeline::{ErrorKind, PipelineError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`PipelineError`] for engine
/// submissions, and adds HTTP-specific variants. Implements
/// [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `archviz_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Submission or wait failure from `archviz_pipeline`.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Direct engine call (image proxy) failed.
    #[error(transparent)]
    Engine(#[from] ComfyUIApiError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            },

            // --- Pipeline errors ---
            AppError::Pipeline(err) => classify_pipeline_error(err),

            // --- Engine errors ---
            AppError::Engine(err) => {
                tracing::warn!(error = %err, "ComfyUI request failed");
                (StatusCode::BAD_GATEWAY, "ENGINE_ERROR", err.to_string())
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a pipeline error into an HTTP status, error code, and message.
///
/// - Missing workflow reference maps to 400, unknown template to 404.
/// - Non-executable templates map to 422.
/// - Unreachable engine maps to 503, malformed or failed engine replies to
///   502, and an exhausted wait to 504.
/// - Unreadable templates map to 500 with a sanitized message.
fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err.kind() {
        ErrorKind::Caller => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        ErrorKind::Shape => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_WORKFLOW",
            err.to_string(),
        ),
        ErrorKind::Connectivity => (
            StatusCode::SERVICE_UNAVAILABLE,
            "ENGINE_UNAVAILABLE",
            err.to_string(),
        ),
        ErrorKind::Protocol | ErrorKind::Transport => {
            tracing::warn!(error = %err, "ComfyUI submission failed");
            (StatusCode::BAD_GATEWAY, "ENGINE_ERROR", err.to_string())
        }
        ErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "ENGINE_TIMEOUT", err.to_string()),
        ErrorKind::Io => internal(&err.to_string()),
    }
}

fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
