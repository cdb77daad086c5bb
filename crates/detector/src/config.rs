//! Detector process configuration

use anyhow::{Context, Result};
use detector_lib::config::{
    ColdStartPolicy, DetectorConfig, TrainingMode, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_RETRAIN_INTERVAL, DEFAULT_SERIES_CAPACITY, DEFAULT_SUBSCRIBER_QUEUE,
};
use detector_lib::model::{IsolationForestTrainer, ModelTrainer, ZScoreTrainer};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Which model family backs every slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerKind {
    #[default]
    IsolationForest,
    Zscore,
}

/// Server configuration, read from `DETECTOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name attached to structured log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// HTTP and WebSocket listen port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_retrain_interval")]
    pub retrain_interval: u64,

    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,

    #[serde(default = "default_training_timeout_ms")]
    pub training_timeout_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default)]
    pub training_mode: TrainingMode,

    #[serde(default)]
    pub cold_start: ColdStartPolicy,

    #[serde(default)]
    pub trainer: TrainerKind,

    /// Isolation forest tree count
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Expected share of outliers in training data
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    /// |z| above which the z-score model flags an outlier
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "anomaly-detector".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_retrain_interval() -> u64 {
    DEFAULT_RETRAIN_INTERVAL
}

fn default_series_capacity() -> usize {
    DEFAULT_SERIES_CAPACITY
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_subscriber_queue() -> usize {
    DEFAULT_SUBSCRIBER_QUEUE
}

fn default_training_timeout_ms() -> u64 {
    5_000
}

fn default_send_timeout_ms() -> u64 {
    2_000
}

fn default_n_trees() -> usize {
    100
}

fn default_contamination() -> f64 {
    0.05
}

fn default_zscore_threshold() -> f64 {
    3.0
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DETECTOR").try_parsing(true))
            .build()
            .context("failed to read detector configuration")?;

        config
            .try_deserialize()
            .context("invalid detector configuration")
    }

    /// Engine knobs for the ingestion pipeline
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            retrain_interval: self.retrain_interval,
            series_capacity: self.series_capacity,
            history_capacity: self.history_capacity,
            subscriber_queue: self.subscriber_queue,
            training_timeout: Duration::from_millis(self.training_timeout_ms),
            training_mode: self.training_mode,
            cold_start: self.cold_start,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
        .sanitized()
    }

    pub fn trainer(&self) -> Arc<dyn ModelTrainer> {
        match self.trainer {
            TrainerKind::IsolationForest => {
                Arc::new(IsolationForestTrainer::new(self.n_trees, self.contamination))
            }
            TrainerKind::Zscore => Arc::new(ZScoreTrainer::new(self.zscore_threshold)),
        }
    }
}
