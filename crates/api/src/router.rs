//! Router assembly shared by the binary and the integration tests.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the façade: `/health` at the root, engine routes under `/comfyui`.
///
/// Request timeouts are attached per route group, since routes that wait on
/// the engine need longer than [`ServerConfig::request_timeout`].
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let health = routes::health::router().route_layer(request_timeout(config.request_timeout()));
    let routes = Router::new()
        .merge(health)
        .nest("/comfyui", routes::comfyui::router(config));

    with_middleware(routes, config).with_state(state)
}

/// Answer 408 once `duration` elapses.
pub(crate) fn request_timeout(duration: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, duration)
}

/// Wrap `routes` in the request pipeline.
///
/// Outermost first, a request passes through CORS, gets an `x-request-id`,
/// is traced, has its id copied onto the response, and any handler panic
/// becomes a 500.
fn with_middleware(routes: Router<AppState>, config: &ServerConfig) -> Router<AppState> {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    routes
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(trace)
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(build_cors_layer(config))
}

/// CORS for the browser front end: GET and POST with JSON bodies.
///
/// Origins were checked by [`ServerConfig`] at load time, so anything that
/// still fails to parse is dropped rather than aborting.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
