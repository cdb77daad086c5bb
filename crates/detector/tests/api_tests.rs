//! Integration tests for the detector HTTP endpoints

#[allow(dead_code)]
#[path = "../src/api.rs"]
mod api;

use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use detector_lib::{
    config::DetectorConfig,
    health::{Component, HealthRegistry},
    model::IsolationForestTrainer,
    observability::StructuredLogger,
    pipeline::IngestionPipeline,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    let pipeline = Arc::new(IngestionPipeline::new(
        DetectorConfig::default(),
        Arc::new(IsolationForestTrainer::default()),
    ));
    let state = Arc::new(AppState::new(
        pipeline,
        health_registry,
        StructuredLogger::new("test"),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_detect(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/detect")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;
    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["ingestion"].is_object());
    assert!(health["components"]["models"].is_object());
    assert!(health["components"]["distribution"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_models_degraded() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(Component::Models, "training for 1/CPU timed out")
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_after_shutdown() {
    let (app, state) = setup_test_app().await;
    state.pipeline.mark_ready(&state.health_registry).await;
    state.pipeline.shut_down(&state.health_registry).await;

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["components"]["distribution"]["message"], "distribution hub closed");
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_pipeline_readiness() {
    let (app, state) = setup_test_app().await;
    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.pipeline.mark_ready(&state.health_registry).await;
    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_detect_returns_predictions_and_rejections() {
    let (app, _state) = setup_test_app().await;
    let (status, body) = post_detect(
        app,
        json!({
            "metrics": [
                { "pid": 1, "metric_type": "CPU", "value": 12.5 },
                { "pid": 1, "metric_type": "TEMPERATURE", "value": 40.0 },
                { "pid": 2, "metric_type": "NETWORK", "interface": "eth0",
                  "received": 100.0, "transmitted": 20.0 }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["result"], 0);
    assert_eq!(predictions[0]["verdict"], "UNKNOWN");
    assert_eq!(body["rejected"][0]["index"], 1);
}

#[tokio::test]
async fn test_detect_keeps_valid_items_when_one_is_mistyped() {
    let (app, state) = setup_test_app().await;
    let (status, body) = post_detect(
        app,
        json!({
            "metrics": [
                { "pid": 1, "metric_type": "CPU", "value": 1.0 },
                { "pid": "abc", "metric_type": "CPU", "value": 1.0 },
                { "pid": 1, "metric_type": "CPU", "value": "high" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 1);
    let rejected = body["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0]["index"], 1);
    assert_eq!(rejected[1]["index"], 2);
    assert_eq!(state.pipeline.hub().history().len(), 1);
}

#[tokio::test]
async fn test_detect_rejects_unparseable_body() {
    let (app, _state) = setup_test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/detect")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_history_lists_published_records_in_order() {
    let (app, _state) = setup_test_app().await;
    let metrics: Vec<Value> = (0..5)
        .map(|i| json!({ "pid": 4, "metric_type": "memory", "value": 100.0 + i as f64 }))
        .collect();
    post_detect(app.clone(), json!({ "metrics": metrics })).await;

    let (status, body) = get_json(app, "/v1/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacity"], 100);

    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 5);
    let seqs: Vec<u64> = records.iter().map(|r| r["seq"].as_u64().unwrap()).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    assert_eq!(records[0]["metric_kind"], "MEMORY");
}

#[tokio::test]
async fn test_models_reports_trained_slots() {
    let (app, _state) = setup_test_app().await;
    let metrics: Vec<Value> = (0..10)
        .map(|i| json!({ "pid": 9, "metric_type": "disk", "value": (i % 3) as f64 }))
        .collect();
    post_detect(app.clone(), json!({ "metrics": metrics })).await;

    let (status, body) = get_json(app, "/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trainer"], "isolation_forest");
    assert_eq!(body["retrain_interval"], 10);
    assert_eq!(body["keys"][0]["entity_id"], 9);
    assert_eq!(body["keys"][0]["series_length"], 10);
    assert_eq!(body["keys"][0]["trained_at_sample_count"], 10);
    assert_eq!(body["keys"][0]["has_model"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;
    state
        .pipeline
        .ingest_batch(&[detector_lib::models::RawMetric::scalar(1, "cpu", 3.0)])
        .await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("anomaly_detector_samples_ingested_total"));
    assert!(metrics_text.contains("anomaly_detector_prediction_latency_seconds_bucket"));
    assert!(metrics_text.contains("anomaly_detector_history_size"));
}
