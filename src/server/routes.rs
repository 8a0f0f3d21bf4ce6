//! Router assembly and the middleware stack.
//!
//! Route hierarchy:
//!
//! ```text
//! GET    /                          redirect to the frontend
//! GET    /health                    liveness + configuration summary
//!
//! POST   /api/upload                multipart PDF (+ optional JSON artifact)
//! POST   /api/process/{job_id}      start the background task
//! POST   /api/continue/{job_id}     resume json_ready → generation
//! GET    /api/status/{job_id}       polled job record
//! GET    /api/download-json/{job_id}  analysis artifact download
//! GET    /api/download/{job_id}     PPTX download
//! DELETE /api/job/{job_id}          cleanup
//!
//! /static/*                         bundled frontend (ServeDir)
//! ```

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::server::handlers;
use crate::server::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/process/{job_id}", post(handlers::process))
        .route("/continue/{job_id}", post(handlers::continue_job))
        .route("/status/{job_id}", get(handlers::status))
        .route("/download-json/{job_id}", get(handlers::download_json))
        .route("/download/{job_id}", get(handlers::download))
        .route("/job/{job_id}", delete(handlers::delete_job));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .nest_service("/static", ServeDir::new(&config.static_dir))
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Propagate request ID to the response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(build_cors_layer(&config.cors_origins))
        // Upload size cap.
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(state)
}

/// Build the CORS middleware layer.
///
/// No configured origins means a permissive policy (the service normally
/// fronts its own bundled frontend); explicit origins get the strict policy
/// with credentials. Panics on an invalid origin — misconfiguration should
/// fail at startup, not per-request.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<_> = origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
