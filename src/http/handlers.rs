//! The HTTP surface: extracts identity/body, invokes the relevant
//! component, renders JSON or the error envelope.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;

use crate::commit::CommitVerifier;
use crate::dispatch::Dispatcher;
use crate::error::{CoreError, CoreResult};
use crate::finalize::Finalizer;
use crate::registry::Registry;
use crate::stats::StatsResponse;
use crate::store::StagingTable;
use crate::submissions;

use super::dto::{
    BatchResponse, ChannelSubmitRequest, CommitRequest, CommitResponse, FinalizeRequest,
    InsertedResponse, PlaylistSubmitRequest, VideoSubmitRequest, WorkerCreatedResponse,
    WorkerIdentified, WorkersResponse,
};
use super::state::AppState;

pub async fn landing_page() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html><html><head><title>archive swarm coordinator</title></head>\
         <body><h1>archive swarm coordinator</h1>\
         <p>See <code>/api/stats</code> for current progress.</p></body></html>",
    )
}

pub async fn metrics(State(state): State<AppState>) -> CoreResult<String> {
    state.metrics.encode().map_err(CoreError::Internal)
}

pub async fn stats(State(state): State<AppState>) -> CoreResult<Json<StatsResponse>> {
    let stats = state.store.stats().await?;
    Ok(Json(StatsResponse::from(stats)))
}

pub async fn workers_for_ip(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> CoreResult<Json<WorkersResponse>> {
    let registry = Registry::new(state.store.as_ref(), state.config.max_workers_per_ip);
    let workers = registry.workers_for_ip(&addr.ip().to_string()).await?;
    Ok(Json(WorkersResponse { workers }))
}

pub async fn create_worker(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> CoreResult<Json<WorkerCreatedResponse>> {
    let registry = Registry::new(state.store.as_ref(), state.config.max_workers_per_ip);
    let ip = addr.ip().to_string();
    let worker_id = registry.create_worker(&ip).await?;
    tracing::info!(worker_id = %worker_id, ip = %ip, "worker enrolled");
    Ok(Json(WorkerCreatedResponse {
        worker_id,
        s3_url: state.config.s3_public_base_url(),
    }))
}

pub async fn dispatch_batch(
    State(state): State<AppState>,
    Json(req): Json<WorkerIdentified>,
) -> CoreResult<Json<BatchResponse>> {
    let registry = Registry::new(state.store.as_ref(), state.config.max_workers_per_ip);
    let worker = registry.resolve(&req.worker_id).await?;

    let dispatcher = Dispatcher::new(state.store.as_ref());
    let mut rng = rand::thread_rng();
    let result = dispatcher.dispatch(&worker, &mut rng).await;

    record_outcome(&state, "dispatch_batch", &result);
    let batch = result?;

    let kind = if batch.finished { "reverify" } else { "new_work" };
    state
        .metrics
        .dispatch_kind_total
        .with_label_values(&[kind])
        .inc();

    Ok(Json(BatchResponse {
        batch_id: batch.id,
        objects: batch.videos,
    }))
}

pub async fn refetch_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(req): Json<WorkerIdentified>,
) -> CoreResult<Json<BatchResponse>> {
    let registry = Registry::new(state.store.as_ref(), state.config.max_workers_per_ip);
    let worker = registry.resolve(&req.worker_id).await?;

    let dispatcher = Dispatcher::new(state.store.as_ref());
    let batch = dispatcher.refetch(&worker, &batch_id).await?;

    Ok(Json(BatchResponse {
        batch_id: batch.id,
        objects: batch.videos,
    }))
}

pub async fn commit(
    State(state): State<AppState>,
    Json(req): Json<CommitRequest>,
) -> CoreResult<Json<CommitResponse>> {
    let registry = Registry::new(state.store.as_ref(), state.config.max_workers_per_ip);
    let worker = registry.resolve(&req.worker_id).await?;

    let verifier = CommitVerifier::new(
        state.store.as_ref(),
        state.objects.as_ref(),
        state.config.content_threshold,
        state.config.trusted_reputation,
    );
    let result = verifier.commit(&worker, &req.batch_id, req.content_size).await;
    record_outcome(&state, "commit", &result);
    let outcome = result?;

    Ok(Json(CommitResponse {
        upload_url: outcome.upload_url,
    }))
}

pub async fn finalize(
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> CoreResult<StatusCode> {
    let registry = Registry::new(state.store.as_ref(), state.config.max_workers_per_ip);
    let worker = registry.resolve(&req.worker_id).await?;

    let finalizer = Finalizer::new(state.store.as_ref(), state.objects.as_ref());
    let result = finalizer.finalize(&worker, &req.batch_id).await;
    record_outcome(&state, "finalize", &result);
    result?;

    Ok(StatusCode::NO_CONTENT)
}

/// Increments `coordinator_requests_total{endpoint,outcome}`. `outcome` is
/// either `ok` or the numeric `error_code` so dashboards can break down
/// failures the same way clients see them.
fn record_outcome<T>(state: &AppState, endpoint: &str, result: &CoreResult<T>) {
    let outcome = match result {
        Ok(_) => "ok".to_string(),
        Err(err) => err.error_code().to_string(),
    };
    state
        .metrics
        .requests_total
        .with_label_values(&[endpoint, &outcome])
        .inc();
}

pub async fn submit_videos(
    State(state): State<AppState>,
    Json(req): Json<VideoSubmitRequest>,
) -> CoreResult<Json<InsertedResponse>> {
    let inserted = submissions::submit(state.store.as_ref(), StagingTable::Videos, req.videos).await?;
    Ok(Json(InsertedResponse { inserted }))
}

pub async fn submit_playlists(
    State(state): State<AppState>,
    Json(req): Json<PlaylistSubmitRequest>,
) -> CoreResult<Json<InsertedResponse>> {
    let inserted =
        submissions::submit(state.store.as_ref(), StagingTable::Playlists, req.playlists).await?;
    Ok(Json(InsertedResponse { inserted }))
}

pub async fn submit_channels(
    State(state): State<AppState>,
    Json(req): Json<ChannelSubmitRequest>,
) -> CoreResult<Json<InsertedResponse>> {
    let inserted =
        submissions::submit(state.store.as_ref(), StagingTable::Channels, req.channels).await?;
    Ok(Json(InsertedResponse { inserted }))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({
        "error": "not found",
        "error_code": 404,
    })))
}
