//! Handlers for the in-process generation queue.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use archviz_core::error::CoreError;
use archviz_core::job::WorkflowRef;

use crate::error::AppResult;
use crate::handlers::comfyui::GenerationRequest;
use crate::response::DataResponse;
use crate::state::AppState;

/// Workflow used when a queued request names none.
const DEFAULT_QUEUE_WORKFLOW: &str = "test";

/// POST /comfyui/queue
///
/// Appends a job and returns its id and 1-based position.
pub async fn enqueue(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let mut request = input.into_job_request()?;
    if request.workflow.is_empty() {
        request.workflow = WorkflowRef::new(Some(DEFAULT_QUEUE_WORKFLOW.to_string()), None);
    }

    let enqueued = state.queue.enqueue(request);
    Ok(DataResponse::json(enqueued))
}

/// GET /comfyui/queue/{job_id}
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = state.queue.status(&job_id).ok_or(CoreError::NotFound {
        entity: "Job",
        id: job_id,
    })?;
    Ok(DataResponse::json(view))
}

/// GET /comfyui/queue-stats
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    DataResponse::json(state.queue.stats())
}
