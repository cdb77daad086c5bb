//! HTTP and WebSocket surface of the detector

use ws_sink::WsSink;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use detector_lib::{
    health::{ComponentStatus, HealthRegistry},
    hub::{pump, HubStats, PumpExit},
    models::{HistoryRecord, RawMetric},
    observability::StructuredLogger,
    pipeline::{BatchOutcome, IngestionPipeline, KeySummary},
};
use futures::StreamExt;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
    pub send_timeout: Duration,
}

impl AppState {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        let send_timeout = pipeline.config().send_timeout;
        Self {
            pipeline,
            health_registry,
            logger,
            send_timeout,
        }
    }
}

/// Items stay undecoded so one mistyped record cannot fail the batch
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub metrics: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct HistoryResponse<'a> {
    capacity: usize,
    stats: HubStats,
    records: Vec<&'a HistoryRecord>,
}

#[derive(Serialize)]
struct ModelsResponse {
    trainer: &'static str,
    retrain_interval: u64,
    keys: Vec<KeySummary>,
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Ingest a batch of raw metrics; rejected items do not fail the request
async fn detect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectRequest>,
) -> Json<BatchOutcome> {
    Json(state.pipeline.ingest_json_batch(&request.metrics).await)
}

async fn history(State(state): State<Arc<AppState>>) -> Response {
    let hub = state.pipeline.hub();
    let records = hub.history();
    Json(HistoryResponse {
        capacity: hub.capacity(),
        stats: hub.stats(),
        records: records.iter().map(|r| r.as_ref()).collect(),
    })
    .into_response()
}

async fn models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let manager = state.pipeline.manager();
    Json(ModelsResponse {
        trainer: manager.trainer_name(),
        retrain_interval: manager.retrain_interval(),
        keys: state.pipeline.key_summaries(),
    })
}

async fn stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Replay history, then forward live records until either side goes away
///
/// Text frames from the client are ingested as single raw metrics.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let hub = Arc::clone(state.pipeline.hub());
    let subscription = state.pipeline.subscribe();
    let id = subscription.id;

    state
        .logger
        .log_subscriber_connected(id, subscription.replay.len());

    let mut pump_task = tokio::spawn(pump(
        Arc::clone(&hub),
        subscription,
        WsSink::new(sender),
        state.send_timeout,
    ));

    let reason = loop {
        tokio::select! {
            exit = &mut pump_task => {
                break match exit {
                    Ok(PumpExit::Closed) => "closed by server".to_string(),
                    Ok(PumpExit::SinkFailed(e)) => format!("send failed: {}", e),
                    Ok(PumpExit::TimedOut) => "send timed out".to_string(),
                    Err(e) => format!("delivery task ended: {}", e),
                };
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => ingest_frame(&state, &text).await,
                Some(Ok(Message::Close(_))) | None => break "closed by client".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("receive failed: {}", e),
            },
        }
    };

    pump_task.abort();
    hub.unsubscribe(id);
    state.logger.log_subscriber_disconnected(id, &reason);
}

async fn ingest_frame(state: &AppState, text: &str) {
    match serde_json::from_str::<RawMetric>(text) {
        Ok(raw) => {
            state
                .pipeline
                .ingest_batch(std::slice::from_ref(&raw))
                .await;
        }
        Err(e) => warn!(error = %e, "Ignoring unparseable stream frame"),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/detect", post(detect))
        .route("/v1/history", get(history))
        .route("/v1/models", get(models))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

mod ws_sink {
    use axum::extract::ws::{Message, WebSocket};
    use detector_lib::{error::DetectorError, hub::RecordSink};
    use futures::{stream::SplitSink, SinkExt};

    /// Outbound half of a client socket
    pub struct WsSink {
        inner: SplitSink<WebSocket, Message>,
    }

    impl WsSink {
        pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
            Self { inner }
        }
    }

    #[async_trait::async_trait]
    impl RecordSink for WsSink {
        async fn deliver(&mut self, payload: &str) -> Result<(), DetectorError> {
            self.inner
                .send(Message::Text(payload.to_string()))
                .await
                .map_err(|e| DetectorError::TransportFailure(e.to_string()))
        }
    }
}
