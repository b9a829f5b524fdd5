use axum::body::Body;
use axum::http::{Request, StatusCode};
use distqueue_common::api::distributor::{StatsResponse, SubmitResponse, WorkResponse};
use distqueue_common::config::DistributorConfig;
use distqueue_distributor::routes::{build_router, AppState};
use distqueue_distributor::Distributor;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let metrics_handle = PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let state = Arc::new(AppState {
        distributor: Distributor::new(DistributorConfig::default()),
        metrics_handle,
    });
    build_router(state)
}

async fn post(app: &axum::Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

async fn get(app: &axum::Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

/// S1: single submit -> pull -> complete round trip.
#[tokio::test]
async fn single_round_trip() {
    let app = test_app();

    let (status, body) = post(
        &app,
        "/submit",
        json!({
            "level": "INFO",
            "message": "hello",
            "source": "s1",
            "metadata": {}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let submit: SubmitResponse = serde_json::from_value(body).unwrap();
    assert_eq!(submit.status, "accepted");

    let (status, body) = post(
        &app,
        "/get_work",
        json!({"analyzer_id": "w", "weight": 0.1, "current_tasks": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let work: WorkResponse = serde_json::from_value(body).unwrap();
    assert!(work.has_work);
    assert_eq!(work.task_id.as_deref(), Some(submit.task_id.as_str()));
    assert_eq!(work.log_data.unwrap().message, "hello");

    let (status, _) = post(
        &app,
        "/status",
        json!({
            "task_id": submit.task_id,
            "analyzer_id": "w",
            "status": "completed",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats: StatsResponse = serde_json::from_value(body).unwrap();
    assert_eq!(stats.total_received, 1);
    assert_eq!(stats.total_completed, 1);
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.in_progress, 0);
}

/// S6: status update referencing an unknown task is acknowledged, not rejected.
#[tokio::test]
async fn status_for_unknown_task_is_acknowledged() {
    let app = test_app();

    let (status, _) = post(
        &app,
        "/status",
        json!({
            "task_id": uuid::Uuid::new_v4().to_string(),
            "analyzer_id": "w",
            "status": "completed",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&app, "/stats").await;
    let stats: StatsResponse = serde_json::from_value(body).unwrap();
    assert_eq!(stats.total_received, 0);
    assert_eq!(stats.total_completed, 0);
}

/// A malformed task id in a status update is a client error, not a
/// silently-ignored unknown task.
#[tokio::test]
async fn status_with_malformed_task_id_is_rejected() {
    let app = test_app();

    let (status, _) = post(
        &app,
        "/status",
        json!({
            "task_id": "not-a-uuid",
            "analyzer_id": "w",
            "status": "completed",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Pull on an empty queue reports no work without mutating state.
#[tokio::test]
async fn pull_on_empty_queue_reports_no_work() {
    let app = test_app();

    let (status, body) = post(
        &app,
        "/get_work",
        json!({"analyzer_id": "w", "weight": 0.1, "current_tasks": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let work: WorkResponse = serde_json::from_value(body).unwrap();
    assert!(!work.has_work);
}

#[tokio::test]
async fn reset_clears_all_state() {
    let app = test_app();
    post(
        &app,
        "/submit",
        json!({"level": "INFO", "message": "x", "source": "s", "metadata": {}}),
    )
    .await;

    let (status, _) = post(&app, "/reset", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&app, "/stats").await;
    let stats: StatsResponse = serde_json::from_value(body).unwrap();
    assert_eq!(stats.total_received, 0);
    assert_eq!(stats.queue_depth, 0);
}
