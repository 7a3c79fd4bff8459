//! Handlers for direct engine access: connectivity, submission with or
//! without waiting, single-shot result polling, workflow validation and the
//! artifact proxy.

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use archviz_core::job::{validate_prompt_text, JobHandle, JobRequest, WorkflowRef};
use archviz_comfyui::history::DEFAULT_ARTIFACT_KIND;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Content type used when the engine does not report one.
const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Cache policy for proxied artifacts.
const IMAGE_CACHE_CONTROL: &str = "public, max-age=3600";

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /comfyui/submit, /comfyui/generate and /comfyui/queue.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: Option<String>,
    pub workflow: Option<String>,
    pub workflow_path: Option<String>,
}

impl GenerationRequest {
    /// Validate the prompt and build a [`JobRequest`].
    pub fn into_job_request(self) -> AppResult<JobRequest> {
        let prompt = self.prompt.unwrap_or_default();
        validate_prompt_text(&prompt)?;
        Ok(JobRequest {
            prompt: Some(prompt),
            workflow: WorkflowRef::new(self.workflow, self.workflow_path),
        })
    }
}

/// Response for POST /comfyui/submit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub is_mock: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultParams {
    pub prompt_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    pub name: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageProxyParams {
    pub filename: Option<String>,
    pub subfolder: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /comfyui/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.prober.probe(&state.config.comfyui_api_url).await;
    DataResponse::json(status)
}

/// POST /comfyui/submit
///
/// Submits one generation and returns its handle without waiting for the
/// engine. When the engine is overloaded the handle is synthetic and
/// `isMock` is set.
pub async fn submit(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let request = input.into_job_request()?;
    let submission = state
        .pipeline
        .submit(request.prompt.as_deref(), &request.workflow)
        .await?;

    tracing::info!(
        job_id = %submission.handle,
        is_mock = submission.is_synthetic(),
        workflow = ?submission.workflow,
        "Prompt submitted",
    );

    Ok(DataResponse::json(SubmitResponse {
        job_id: submission.handle.as_str().to_string(),
        is_mock: submission.is_synthetic(),
    }))
}

/// POST /comfyui/generate
///
/// Submits and blocks until the engine produces artifacts. Bypasses the
/// queue, so callers should prefer `/queue` under load.
pub async fn generate(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let request = input.into_job_request()?;
    let result = state.generator.generate(&request).await?;

    tracing::info!(
        prompt_id = %result.prompt_id,
        artifacts = result.artifacts.len(),
        execution_time_ms = result.execution_time_ms,
        is_mock = result.is_mock,
        "Generation completed",
    );

    Ok(DataResponse::json(result))
}

/// GET /comfyui/result?promptId=
///
/// One history check. `ready = false` means keep polling, with or without
/// an `error`.
pub async fn get_result(
    State(state): State<AppState>,
    Query(params): Query<ResultParams>,
) -> AppResult<impl IntoResponse> {
    let prompt_id = params
        .prompt_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("promptId is required".into()))?;

    let outcome = state.poller.poll_once(&JobHandle::parse(&prompt_id)).await;
    Ok(DataResponse::json(outcome))
}

/// GET /comfyui/workflow/validate?name=&path=
pub async fn validate_workflow(
    State(state): State<AppState>,
    Query(params): Query<ValidateParams>,
) -> impl IntoResponse {
    let workflow = WorkflowRef::new(params.name, params.path);
    DataResponse::json(state.pipeline.resolver().validate(&workflow))
}

/// GET /comfyui/image-proxy?filename=&subfolder=&type=
///
/// Streams artifact bytes from the engine's `/view` so clients never see
/// the engine's address.
pub async fn image_proxy(
    State(state): State<AppState>,
    Query(params): Query<ImageProxyParams>,
) -> AppResult<Response> {
    let filename = params
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("filename is required".into()))?;
    let subfolder = params.subfolder.unwrap_or_default();
    let kind = params
        .kind
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ARTIFACT_KIND.to_string());

    let view = state.comfyui.view(&filename, &subfolder, &kind).await?;
    let content_type = view
        .content_type
        .unwrap_or_else(|| DEFAULT_IMAGE_CONTENT_TYPE.to_string());

    tracing::debug!(filename = %filename, bytes = view.bytes.len(), "Proxied artifact");

    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
        ],
        view.bytes,
    )
        .into_response())
}
