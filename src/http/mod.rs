mod dto;
mod handlers;
pub mod redirect;
pub mod state;

pub use state::{AppState, Metrics};

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the full router: the worker/batch protocol, the read-only stats
/// and metrics endpoints, and the CORS-enabled community submission
/// endpoints.
pub fn router(state: AppState) -> Router {
    let submission_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let submissions = Router::new()
        .route("/api/videos/submit", post(handlers::submit_videos))
        .route("/api/playlists/submit", post(handlers::submit_playlists))
        .route("/api/channels/submit", post(handlers::submit_channels))
        .layer(submission_cors);

    Router::new()
        .route("/", get(handlers::landing_page))
        .route("/metrics", get(handlers::metrics))
        .route("/api/stats", get(handlers::stats))
        .route("/api/workers", get(handlers::workers_for_ip))
        .route("/api/workers/create", post(handlers::create_worker))
        .route("/api/batches", post(handlers::dispatch_batch))
        .route("/api/batches/:id", post(handlers::refetch_batch))
        .route("/api/commit", post(handlers::commit))
        .route("/api/finalize", post(handlers::finalize))
        .merge(submissions)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
