//! HTTP-level integration tests for the generation queue endpoints.
//!
//! The queue worker is not running here; tests drive it one cycle at a
//! time through `QueueManager::process_next` with a stub executor.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use archviz_api::engine::queue::JobExecutor;
use archviz_core::job::{Artifact, GenerationResult, JobRequest};
use archviz_pipeline::PipelineError;
use common::{body_json, build_test_app_with_executor, get, post_json};
use serde_json::json;

/// Succeeds for every prompt except `"fail"`.
struct StubExecutor;

#[async_trait]
impl JobExecutor for StubExecutor {
    async fn execute(&self, request: &JobRequest) -> Result<GenerationResult, PipelineError> {
        if request.prompt.as_deref() == Some("fail") {
            return Err(PipelineError::Protocol("response has no prompt_id".into()));
        }
        Ok(GenerationResult {
            prompt_id: "abc".into(),
            artifacts: vec![Artifact {
                filename: "out.png".into(),
                subfolder: String::new(),
                kind: "output".into(),
                retrieval_ref: "/comfyui/image-proxy?filename=out.png&subfolder=&type=output".into(),
            }],
            workflow: request.workflow.name.clone(),
            execution_time_ms: 12,
            is_mock: false,
        })
    }
}

fn app() -> (tempfile::TempDir, axum::Router, archviz_api::state::AppState) {
    let root = tempfile::tempdir().unwrap();
    let (app, state) = build_test_app_with_executor("/comfy", root.path(), Arc::new(StubExecutor));
    (root, app, state)
}

// ---------------------------------------------------------------------------
// Test: POST /comfyui/queue returns id and 1-based position
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_returns_id_and_position() {
    let (_root, app, _state) = app();

    let first = body_json(post_json(app.clone(), "/comfyui/queue", json!({ "prompt": "a" })).await).await;
    let second = body_json(post_json(app, "/comfyui/queue", json!({ "prompt": "b" })).await).await;

    assert_eq!(first["data"]["position"], 1);
    assert_eq!(second["data"]["position"], 2);
    assert_ne!(first["data"]["jobId"], second["data"]["jobId"]);
}

// ---------------------------------------------------------------------------
// Test: queued job status moves from pending to completed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_status_reflects_processing() {
    let (_root, app, state) = app();

    let enqueued = body_json(post_json(app.clone(), "/comfyui/queue", json!({ "prompt": "villa" })).await).await;
    let job_id = enqueued["data"]["jobId"].as_str().unwrap().to_string();
    let uri = format!("/comfyui/queue/{job_id}");

    let pending = body_json(get(app.clone(), &uri).await).await;
    assert_eq!(pending["data"]["status"], "pending");
    assert_eq!(pending["data"]["position"], 1);

    assert!(state.queue.process_next().await);

    let done = body_json(get(app, &uri).await).await;
    assert_eq!(done["data"]["status"], "completed");
    assert_eq!(done["data"]["position"], 0);
    assert_eq!(done["data"]["result"]["promptId"], "abc");
    // Queue requests without a workflow run the default template.
    assert_eq!(done["data"]["result"]["workflow"], "test");
    assert!(done["data"].get("error").is_none());
}

// ---------------------------------------------------------------------------
// Test: executor failure surfaces as a failed job with its message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_carries_error() {
    let (_root, app, state) = app();

    let enqueued = body_json(post_json(app.clone(), "/comfyui/queue", json!({ "prompt": "fail" })).await).await;
    let job_id = enqueued["data"]["jobId"].as_str().unwrap().to_string();
    state.queue.process_next().await;

    let json = body_json(get(app, &format!("/comfyui/queue/{job_id}")).await).await;
    assert_eq!(json["data"]["status"], "failed");
    assert!(json["data"]["error"].as_str().unwrap().contains("prompt_id"));
    assert!(json["data"].get("result").is_none());
}

// ---------------------------------------------------------------------------
// Test: unknown job id is 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let (_root, app, _state) = app();

    let response = get(app, "/comfyui/queue/not-a-job").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: empty prompt is rejected before queuing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_without_prompt_returns_400() {
    let (_root, app, state) = app();

    let response = post_json(app, "/comfyui/queue", json!({ "workflow": "test" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.queue.stats().queue_length, 0);
}

// ---------------------------------------------------------------------------
// Test: GET /comfyui/queue-stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_count_each_structure() {
    let (_root, app, state) = app();

    post_json(app.clone(), "/comfyui/queue", json!({ "prompt": "a" })).await;
    post_json(app.clone(), "/comfyui/queue", json!({ "prompt": "b" })).await;
    state.queue.process_next().await;

    let json = body_json(get(app, "/comfyui/queue-stats").await).await;
    assert_eq!(json["data"]["queueLength"], 1);
    assert_eq!(json["data"]["processingCount"], 0);
    assert_eq!(json["data"]["completedCacheCount"], 1);
}
