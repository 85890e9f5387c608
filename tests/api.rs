//! Full-router integration tests driving the worker/batch protocol's
//! end-to-end scenarios against `MockStore`/`MockObjectStore` behind the
//! same `axum::Router` the binary serves, via `tower::ServiceExt::oneshot`.

use std::net::SocketAddr;
use std::sync::Arc;

use archive_swarm_coordinator::config::Args;
use archive_swarm_coordinator::http::state::{AppState, Metrics};
use archive_swarm_coordinator::http::router;
use archive_swarm_coordinator::models::Batch;
use archive_swarm_coordinator::objectstore::mock::MockObjectStore;
use archive_swarm_coordinator::store::mock::MockStore;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_args() -> Args {
    Args {
        host: "0.0.0.0".into(),
        port: 8000,
        tls_cert: None,
        tls_key: None,
        public_host: "localhost".into(),
        database_url: None,
        db_host: "localhost".into(),
        db_port: 5432,
        db_user: "postgres".into(),
        db_password: String::new(),
        db_name: "archive_swarm".into(),
        db_pool_size: 4,
        s3_access_key: "key".into(),
        s3_secret_key: "secret".into(),
        s3_region: "us-east-1".into(),
        s3_bucket: "bucket".into(),
        s3_endpoint: None,
        s3_presign_ttl_secs: 3600,
        content_threshold: 0.05,
        trusted_reputation: 100,
        max_workers_per_ip: 1000,
    }
}

fn test_state(store: Arc<MockStore>, objects: Arc<MockObjectStore>) -> AppState {
    AppState {
        store,
        objects,
        config: Arc::new(test_args()),
        metrics: Arc::new(Metrics::new().unwrap()),
    }
}

fn unfinished_batch(id: &str) -> Batch {
    Batch {
        id: id.to_string(),
        start_ctid: "a".into(),
        end_ctid: "b".into(),
        finished: false,
        content_size: None,
        videos: vec!["vid1".into(), "vid2".into()],
        version: 0,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn enroll_and_first_dispatch() {
    let store = Arc::new(MockStore::new(1));
    store.insert_batch(unfinished_batch("B1"));
    let objects = Arc::new(MockObjectStore::new());
    let app = router(test_state(store.clone(), objects));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/workers/create", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let worker_id = body["worker_id"].as_str().unwrap().to_string();
    assert!(body["s3_url"].as_str().unwrap().starts_with("https://"));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/batches",
            json!({"worker_id": worker_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["batch_id"], "B1");
    assert_eq!(body["objects"], json!(["vid1", "vid2"]));

    let worker = store.worker(&worker_id).unwrap();
    assert_eq!(worker.current_batch.as_deref(), Some("B1"));
}

#[tokio::test]
async fn first_finalize_establishes_oracle() {
    let store = Arc::new(MockStore::new(1));
    store.insert_batch(unfinished_batch("B1"));
    let objects = Arc::new(MockObjectStore::new());
    objects.seed_object("B1.json.gz", 12345);
    let app = router(test_state(store.clone(), objects));

    store.insert_worker(worker_with_batch("w1", "B1"));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/finalize",
            json!({"worker_id": "w1", "batch_id": "B1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let batch = store.batch("B1").unwrap();
    assert!(batch.finished);
    assert_eq!(batch.content_size, Some(12345));

    let worker = store.worker("w1").unwrap();
    assert_eq!(worker.reputation, 1);
    assert_eq!(worker.current_batch, None);
    assert!(worker.last_committed.is_some());
}

#[tokio::test]
async fn verification_hit_returns_empty_upload_url() {
    let store = Arc::new(MockStore::new(1));
    let mut finished = unfinished_batch("B1");
    finished.finished = true;
    finished.content_size = Some(12345);
    store.insert_batch(finished);
    store.insert_worker(worker_with_batch("w2", "B1"));
    let objects = Arc::new(MockObjectStore::new());
    let app = router(test_state(store.clone(), objects));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/commit",
            json!({"worker_id": "w2", "batch_id": "B1", "content_size": 12400}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["upload_url"], "");

    let worker = store.worker("w2").unwrap();
    assert_eq!(worker.reputation, 1);
    assert_eq!(worker.current_batch, None);
}

#[tokio::test]
async fn verification_miss_disables_untrusted_worker() {
    let store = Arc::new(MockStore::new(1));
    let mut finished = unfinished_batch("B1");
    finished.finished = true;
    finished.content_size = Some(12345);
    store.insert_batch(finished);
    store.insert_worker(worker_with_batch("w3", "B1"));
    let objects = Arc::new(MockObjectStore::new());
    let app = router(test_state(store.clone(), objects));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/commit",
            json!({"worker_id": "w3", "batch_id": "B1", "content_size": 99999}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], 8);
    assert_eq!(body["batch_id"], "B1");

    let worker = store.worker("w3").unwrap();
    assert_eq!(worker.reputation, -10);
    assert!(worker.disabled);
    assert_eq!(worker.current_batch.as_deref(), Some("B1"));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/batches",
            json!({"worker_id": "w3"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], 3);
}

#[tokio::test]
async fn trusted_overwrite_bumps_version_and_keeps_worker_bound() {
    let store = Arc::new(MockStore::new(1));
    let mut finished = unfinished_batch("B1");
    finished.finished = true;
    finished.content_size = Some(12345);
    finished.version = 0;
    store.insert_batch(finished);
    store.insert_worker({
        let mut w = worker_with_batch("w4", "B1");
        w.reputation = 150;
        w
    });
    let objects = Arc::new(MockObjectStore::new());
    let app = router(test_state(store.clone(), objects));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/commit",
            json!({"worker_id": "w4", "batch_id": "B1", "content_size": 99999}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["upload_url"].as_str().unwrap().contains("B1.json.gz-0"));

    let batch = store.batch("B1").unwrap();
    assert_eq!(batch.version, 1);
    assert_eq!(batch.content_size, Some(99999));

    let worker = store.worker("w4").unwrap();
    assert_eq!(worker.current_batch.as_deref(), Some("B1"));
}

#[tokio::test]
async fn must_commit_current_gate() {
    let store = Arc::new(MockStore::new(1));
    store.insert_batch(unfinished_batch("B1"));
    store.insert_worker(worker_with_batch("w5", "B1"));
    let objects = Arc::new(MockObjectStore::new());
    let app = router(test_state(store, objects));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/batches",
            json!({"worker_id": "w5"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], 4);
    assert_eq!(body["batch_id"], "B1");
}

#[tokio::test]
async fn submission_filters_by_id_shape_and_dedups() {
    let store = Arc::new(MockStore::new(1));
    let objects = Arc::new(MockObjectStore::new());
    let app = router(test_state(store, objects));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/videos/submit",
            json!({"videos": ["abc", "aaaaaaaaaaa"]}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["inserted"], json!(["aaaaaaaaaaa"]));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/videos/submit",
            json!({"videos": ["aaaaaaaaaaa"]}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["inserted"], json!([]));
}

// Shared helper, defined at crate-test scope so each `#[tokio::test]` function
// above can reach it without re-deriving worker construction boilerplate.
fn worker_with_batch(id: &str, batch_id: &str) -> archive_swarm_coordinator::models::Worker {
    archive_swarm_coordinator::models::Worker {
        id: id.to_string(),
        ip: "127.0.0.1".to_string(),
        reputation: 0,
        disabled: false,
        current_batch: Some(batch_id.to_string()),
        last_committed: None,
        created_at: chrono::Utc::now(),
    }
}
