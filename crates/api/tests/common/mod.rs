#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use archviz_api::config::ServerConfig;
use archviz_api::engine::queue::JobExecutor;
use archviz_api::router::build_app_router;
use archviz_api::state::AppState;

/// Build a test `ServerConfig` pointing at `engine_url`, with templates
/// looked up under `install_root/comfyui_workflows`.
pub fn test_config(engine_url: &str, install_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        comfyui_api_url: engine_url.to_string(),
        comfyui_proxy_origin: None,
        comfyui_timeout_ms: 5_000,
        workflow_dir: "comfyui_workflows".into(),
        install_root: install_root.to_path_buf(),
        queue_job_timeout_secs: 5,
        queue_completed_ttl_secs: 3600,
    }
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app(engine_url: &str, install_root: &Path) -> Router {
    let config = test_config(engine_url, install_root);
    let state = AppState::new(config.clone(), install_root.to_path_buf());
    build_app_router(state, &config)
}

/// Same as [`build_test_app`] but with an explicit configuration.
pub fn build_test_app_with_config(config: ServerConfig) -> Router {
    let state = AppState::new(config.clone(), config.install_root.clone());
    build_app_router(state, &config)
}

/// Same as [`build_test_app`] but with a custom queue executor. Returns the
/// state too so tests can drive the queue directly.
pub fn build_test_app_with_executor(
    engine_url: &str,
    install_root: &Path,
    executor: Arc<dyn JobExecutor>,
) -> (Router, AppState) {
    let config = test_config(engine_url, install_root);
    let state = AppState::with_executor(config.clone(), install_root.to_path_buf(), executor);
    (build_app_router(state.clone(), &config), state)
}

/// Write `<install_root>/comfyui_workflows/<name>.json`.
pub fn write_workflow(install_root: &Path, name: &str, body: &serde_json::Value) {
    let dir = install_root.join("comfyui_workflows");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{name}.json")), body.to_string()).unwrap();
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
