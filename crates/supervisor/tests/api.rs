use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use distqueue_common::config::SupervisorConfig;
use distqueue_supervisor::pool::AnalyzerPool;
use distqueue_supervisor::routes::{build_router, AppState};
use distqueue_supervisor::worker::{Processor, SimulatedProcessor};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

async fn test_app() -> axum::Router {
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    let processor: Arc<dyn Processor> = Arc::new(SimulatedProcessor::new(Duration::from_millis(1)));
    let pool = Arc::new(AnalyzerPool::new(
        SupervisorConfig {
            num_analyzers: 2,
            ..SupervisorConfig::default()
        },
        processor,
    ));
    pool.start().await;
    let state = Arc::new(AppState { pool, metrics_handle });
    build_router(state)
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
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app().await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn stats_reports_starting_fleet_size() {
    let app = test_app().await;
    let (status, body) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzer_count"], 2);
    assert_eq!(body["total_processed"], 0);
}

#[tokio::test]
async fn prometheus_metrics_is_exposed_as_plain_text() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/prometheus_metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
