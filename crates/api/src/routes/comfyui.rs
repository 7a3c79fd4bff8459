//! Route definitions for the engine façade and the generation queue.

use axum::routing::{get, post};
use axum::Router;

use crate::config::ServerConfig;
use crate::handlers::{comfyui, queue};
use crate::router::request_timeout;
use crate::state::AppState;

/// Routes mounted at `/comfyui`.
///
/// ```text
/// GET  /status             -> get_status
/// POST /submit             -> submit              (submit timeout)
/// POST /generate           -> generate            (generate timeout)
/// GET  /result             -> get_result
/// GET  /workflow/validate  -> validate_workflow
/// GET  /image-proxy        -> image_proxy
///
/// POST /queue              -> enqueue
/// GET  /queue/{job_id}     -> get_job_status
/// GET  /queue-stats        -> get_stats
/// ```
pub fn router(config: &ServerConfig) -> Router<AppState> {
    let quick = Router::new()
        .route("/status", get(comfyui::get_status))
        .route("/result", get(comfyui::get_result))
        .route("/workflow/validate", get(comfyui::validate_workflow))
        .route("/image-proxy", get(comfyui::image_proxy))
        .route("/queue", post(queue::enqueue))
        .route("/queue/{job_id}", get(queue::get_job_status))
        .route("/queue-stats", get(queue::get_stats))
        .route_layer(request_timeout(config.request_timeout()));

    let submit = Router::new()
        .route("/submit", post(comfyui::submit))
        .route_layer(request_timeout(config.submit_request_timeout()));

    let generate = Router::new()
        .route("/generate", post(comfyui::generate))
        .route_layer(request_timeout(config.generate_request_timeout()));

    quick.merge(submit).merge(generate)
}
