//! Anomaly Detector - streaming per-process anomaly detection service
//!
//! Accepts raw process metrics over HTTP and WebSocket, keeps one model
//! per (process, metric) key and streams every verdict to live
//! subscribers.

use anyhow::Result;
use detector_lib::{
    health::HealthRegistry, observability::StructuredLogger, pipeline::IngestionPipeline,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const DETECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting anomaly-detector");

    let config = config::ServerConfig::load()?;
    info!(
        instance = %config.instance,
        trainer = ?config.trainer,
        training_mode = ?config.training_mode,
        "Detector configured"
    );

    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new(&config.instance);

    let pipeline = Arc::new(
        IngestionPipeline::new(config.detector_config(), config.trainer())
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );
    logger.log_startup(
        DETECTOR_VERSION,
        pipeline.manager().trainer_name(),
        pipeline.manager().retrain_interval(),
    );

    let app_state = Arc::new(api::AppState::new(
        Arc::clone(&pipeline),
        health_registry.clone(),
        logger.clone(),
    ));

    pipeline.mark_ready(&health_registry).await;

    let shutdown = {
        let pipeline = Arc::clone(&pipeline);
        let health_registry = health_registry.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            let closed = pipeline.shut_down(&health_registry).await;
            info!(subscribers = closed, "Closed live subscriptions");
        }
    };

    api::serve(config.api_port, app_state, shutdown).await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
