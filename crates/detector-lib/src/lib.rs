//! Streaming anomaly detection engine
//!
//! This crate provides the core functionality for:
//! - Routing raw per-process metrics into keyed samples
//! - Bounded per-key time series storage
//! - Per-key model training, retraining and scoring
//! - Bounded prediction history with live fan-out to subscribers
//! - Health checks and observability

pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod lifecycle;
pub mod model;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod router;
pub mod store;

pub use config::{ColdStartPolicy, DetectorConfig, TrainingMode};
pub use error::{DetectorError, ModelError, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use hub::{pump, DistributionHub, HubStats, PumpExit, RecordSink, Subscription};
pub use lifecycle::{ModelManager, SlotSummary, TrainingOutcome};
pub use model::{AnomalyModel, IsolationForestTrainer, ModelTrainer, ZScoreTrainer};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
pub use pipeline::{BatchOutcome, IngestionPipeline, KeySummary, RejectedSample};
