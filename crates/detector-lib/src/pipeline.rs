//! Ingestion pipeline
//!
//! Composes routing, storage, model lifecycle and distribution. Samples
//! for one key are processed strictly one at a time in arrival order;
//! samples for different keys proceed concurrently.

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::health::{Component, HealthRegistry};
use crate::hub::{DistributionHub, Subscription};
use crate::lifecycle::ModelManager;
use crate::model::ModelTrainer;
use crate::models::{HistoryRecord, Prediction, RawMetric, Sample, SampleKey};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::router;
use crate::store::TimeSeriesStore;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// A batch item the router refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSample {
    pub index: usize,
    pub reason: String,
}

/// Result of ingesting a batch of raw metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub predictions: Vec<Prediction>,
    pub rejected: Vec<RejectedSample>,
}

/// One row of the per-key introspection view
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    #[serde(flatten)]
    pub key: SampleKey,
    pub series_length: u64,
    pub retained: usize,
    pub has_model: bool,
    pub trained_at_sample_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

pub struct IngestionPipeline {
    store: TimeSeriesStore,
    manager: ModelManager,
    hub: Arc<DistributionHub>,
    key_locks: DashMap<SampleKey, Arc<Mutex<()>>>,
    config: DetectorConfig,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
}

impl IngestionPipeline {
    pub fn new(config: DetectorConfig, trainer: Arc<dyn ModelTrainer>) -> Self {
        let config = config.sanitized();
        Self {
            store: TimeSeriesStore::new(config.series_capacity),
            manager: ModelManager::new(trainer, &config),
            hub: Arc::new(DistributionHub::new(
                config.history_capacity,
                config.subscriber_queue,
            )),
            key_locks: DashMap::new(),
            config,
            metrics: DetectorMetrics::new(),
            logger: StructuredLogger::new("anomaly-detector"),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.manager = self.manager.with_health(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.manager = self.manager.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// Route one raw metric and process every sample it produces
    ///
    /// A network metric yields two samples which are processed back to
    /// back, so both directions of an interface always hold equal counts.
    pub async fn ingest(&self, raw: &RawMetric) -> Result<Vec<Prediction>> {
        let samples = router::route(raw, Utc::now())?;
        let mut predictions = Vec::with_capacity(samples.len());
        for sample in samples {
            predictions.push(self.ingest_sample(sample).await);
        }
        Ok(predictions)
    }

    /// Ingest a batch, isolating failures to the item that caused them
    pub async fn ingest_batch(&self, metrics: &[RawMetric]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (index, raw) in metrics.iter().enumerate() {
            let result = self.ingest(raw).await;
            self.collect(&mut outcome, index, result);
        }

        outcome
    }

    /// Ingest a batch of undecoded records
    ///
    /// Items that do not decode as a [`RawMetric`] are rejected one by one
    /// like any other malformed input.
    pub async fn ingest_json_batch(&self, items: &[serde_json::Value]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (index, item) in items.iter().enumerate() {
            let result = match RawMetric::deserialize(item) {
                Ok(raw) => self.ingest(&raw).await,
                Err(e) => Err(DetectorError::malformed(e.to_string())),
            };
            self.collect(&mut outcome, index, result);
        }

        outcome
    }

    fn collect(&self, outcome: &mut BatchOutcome, index: usize, result: Result<Vec<Prediction>>) {
        match result {
            Ok(predictions) => outcome.predictions.extend(predictions),
            Err(e) => {
                let reason = e.to_string();
                self.metrics.inc_samples_rejected();
                self.logger.log_rejected(index, &reason);
                outcome.rejected.push(RejectedSample { index, reason });
            }
        }
    }

    /// Append, retrain if due, score and publish one sample
    pub async fn ingest_sample(&self, sample: Sample) -> Prediction {
        let key = sample.key.clone();
        let lock = self
            .key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let count = self.store.append(sample.clone());
        if self.manager.is_retrain_point(count) {
            // Failures are logged by the manager; the previous model keeps serving
            if let Err(e) = self
                .manager
                .observe(&key, count, self.store.values(&key))
                .await
            {
                debug!(key = %key, kind = e.kind(), error = %e, "Retrain did not produce a model");
            }
        }

        let prediction = self.manager.predict(&key, sample.value);
        if prediction.verdict.is_anomaly() {
            self.logger.log_anomaly(&key, sample.value);
        }

        self.hub
            .publish(HistoryRecord::new(sample, prediction.clone()));

        self.metrics.inc_samples_ingested();
        self.metrics.set_active_keys(self.store.len() as i64);
        prediction
    }

    /// Register a live subscriber on the distribution hub
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Per-key series and model state, ordered by key
    pub fn key_summaries(&self) -> Vec<KeySummary> {
        let mut rows: Vec<KeySummary> = self
            .store
            .keys()
            .into_iter()
            .map(|key| {
                let slot = self.manager.slot(&key);
                KeySummary {
                    series_length: self.store.total_count(&key),
                    retained: self.store.retained(&key),
                    has_model: slot.as_ref().is_some_and(|s| s.has_model),
                    trained_at_sample_count: slot.as_ref().map_or(0, |s| s.trained_at_sample_count),
                    last_failure: slot.and_then(|s| s.last_failure),
                    key,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    pub fn hub(&self) -> &Arc<DistributionHub> {
        &self.hub
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Mark the pipeline's health components as serving
    pub async fn mark_ready(&self, health: &HealthRegistry) {
        health.set_healthy(Component::Ingestion).await;
        health.set_healthy(Component::Distribution).await;
        health.set_ready(true).await;
    }

    /// Take the pipeline out of service and end every live stream
    ///
    /// Returns the number of subscriptions that were closed.
    pub async fn shut_down(&self, health: &HealthRegistry) -> usize {
        health.set_ready(false).await;
        let closed = self.hub.close_all();
        health
            .set_unhealthy(Component::Distribution, "distribution hub closed")
            .await;
        closed
    }
}
