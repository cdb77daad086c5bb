//! Model lifecycle management
//!
//! Owns one model slot per key. A slot is refit from scratch whenever its
//! key's sample count reaches a positive multiple of the retrain interval;
//! a successful fit replaces the slot's model, a failed or timed out fit
//! leaves the last good model serving. Scoring clones the slot's model
//! handle and releases the slot before scoring, so a concurrent
//! replacement is observed either fully or not at all.

use crate::config::{ColdStartPolicy, DetectorConfig, TrainingMode};
use crate::error::{DetectorError, ModelError, Result};
use crate::health::{Component, HealthRegistry};
use crate::model::{AnomalyModel, ModelTrainer};
use crate::models::{Prediction, SampleKey, Verdict};
use crate::observability::{DetectorMetrics, StructuredLogger};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// What `observe` did for one sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// Count is not a retrain point
    Skipped,
    /// A new model was installed at this sample count
    Trained { sample_count: u64 },
    /// Fit handed to a background task
    Scheduled { sample_count: u64 },
    /// A model at an equal or later sample count was already installed
    Superseded { sample_count: u64 },
}

/// Introspection view of one slot
#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    #[serde(flatten)]
    pub key: SampleKey,
    pub has_model: bool,
    pub trained_at_sample_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

#[derive(Default)]
struct ModelSlot {
    model: Option<Arc<dyn AnomalyModel>>,
    trained_at: u64,
    last_failure: Option<String>,
}

struct SlotEntry {
    state: RwLock<ModelSlot>,
    /// Held for the full duration of a fit, so fits for one key never overlap
    train_gate: Arc<Mutex<()>>,
}

impl SlotEntry {
    fn new() -> Self {
        Self {
            state: RwLock::new(ModelSlot::default()),
            train_gate: Arc::new(Mutex::new(())),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&ModelSlot) -> T) -> T {
        match self.state.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut ModelSlot) -> T) -> T {
        match self.state.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Everything a fit needs, cloneable into a background task
#[derive(Clone)]
struct TrainContext {
    trainer: Arc<dyn ModelTrainer>,
    timeout: Duration,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

/// Owns and serves the per-key model slots
pub struct ModelManager {
    slots: DashMap<SampleKey, Arc<SlotEntry>>,
    ctx: TrainContext,
    retrain_interval: u64,
    mode: TrainingMode,
    cold_start: ColdStartPolicy,
}

impl ModelManager {
    pub fn new(trainer: Arc<dyn ModelTrainer>, config: &DetectorConfig) -> Self {
        Self {
            slots: DashMap::new(),
            ctx: TrainContext {
                trainer,
                timeout: config.training_timeout,
                metrics: DetectorMetrics::new(),
                logger: StructuredLogger::new("anomaly-detector"),
                health: None,
            },
            retrain_interval: config.retrain_interval.max(1),
            mode: config.training_mode,
            cold_start: config.cold_start,
        }
    }

    /// Report training health on the `models` component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.ctx.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.ctx.logger = logger;
        self
    }

    pub fn trainer_name(&self) -> &'static str {
        self.ctx.trainer.name()
    }

    pub fn retrain_interval(&self) -> u64 {
        self.retrain_interval
    }

    /// True when `sample_count` is a positive multiple of the retrain interval
    pub fn is_retrain_point(&self, sample_count: u64) -> bool {
        sample_count > 0 && sample_count % self.retrain_interval == 0
    }

    /// Retrain the key's model if `sample_count` is a retrain point
    ///
    /// `values` is the key's retained series, oldest first. Callers must
    /// serialize `observe` per key so every retrain point is seen once.
    pub async fn observe(
        &self,
        key: &SampleKey,
        sample_count: u64,
        values: Vec<f64>,
    ) -> Result<TrainingOutcome> {
        if !self.is_retrain_point(sample_count) {
            return Ok(TrainingOutcome::Skipped);
        }

        let entry = self.entry(key);
        match self.mode {
            TrainingMode::Inline => train(self.ctx.clone(), key.clone(), entry, sample_count, values).await,
            TrainingMode::Background => {
                let ctx = self.ctx.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    // Failures are logged and counted inside `train`
                    let _ = train(ctx, key, entry, sample_count, values).await;
                });
                Ok(TrainingOutcome::Scheduled { sample_count })
            }
        }
    }

    /// Classify `value` with the key's current model
    ///
    /// Has no side effects on the slot. Keys without a model get the
    /// configured cold-start verdict; a scoring error yields `Unknown`.
    pub fn predict(&self, key: &SampleKey, value: f64) -> Prediction {
        let start = Instant::now();
        let model = self
            .slots
            .get(key)
            .and_then(|entry| entry.read(|slot| slot.model.clone()));

        let verdict = match model {
            None => self.cold_start_verdict(),
            Some(model) => match model.score(value) {
                Ok(outlier) if outlier.is_outlier => Verdict::Anomaly,
                Ok(_) => Verdict::Normal,
                Err(e) => {
                    let err = DetectorError::UpstreamUnavailable(e.to_string());
                    warn!(key = %key, error = %err, "Scoring failed, returning unknown verdict");
                    Verdict::Unknown
                }
            },
        };

        self.ctx
            .metrics
            .record_prediction(verdict, start.elapsed().as_secs_f64());
        Prediction::new(key.clone(), value, verdict)
    }

    pub fn cold_start_verdict(&self) -> Verdict {
        match self.cold_start {
            ColdStartPolicy::Unknown => Verdict::Unknown,
            ColdStartPolicy::Normal => Verdict::Normal,
        }
    }

    /// Sample count of the installed model, 0 while cold
    pub fn trained_at(&self, key: &SampleKey) -> u64 {
        self.slots
            .get(key)
            .map(|entry| entry.read(|slot| slot.trained_at))
            .unwrap_or(0)
    }

    pub fn has_model(&self, key: &SampleKey) -> bool {
        self.slots
            .get(key)
            .map(|entry| entry.read(|slot| slot.model.is_some()))
            .unwrap_or(false)
    }

    pub fn slot(&self, key: &SampleKey) -> Option<SlotSummary> {
        self.slots
            .get(key)
            .map(|entry| summarize(key, entry.value()))
    }

    /// Summaries of every slot, ordered by key
    pub fn slots(&self) -> Vec<SlotSummary> {
        let mut summaries: Vec<SlotSummary> = self
            .slots
            .iter()
            .map(|item| summarize(item.key(), item.value()))
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn entry(&self, key: &SampleKey) -> Arc<SlotEntry> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SlotEntry::new()))
            .clone()
    }
}

fn summarize(key: &SampleKey, entry: &SlotEntry) -> SlotSummary {
    entry.read(|slot| SlotSummary {
        key: key.clone(),
        has_model: slot.model.is_some(),
        trained_at_sample_count: slot.trained_at,
        last_failure: slot.last_failure.clone(),
    })
}

/// Fit a model for `key` and install it unless a newer one is already in place
async fn train(
    ctx: TrainContext,
    key: SampleKey,
    entry: Arc<SlotEntry>,
    sample_count: u64,
    values: Vec<f64>,
) -> Result<TrainingOutcome> {
    let start = Instant::now();
    let gate = Arc::clone(&entry.train_gate);
    let trainer = Arc::clone(&ctx.trainer);
    let retained = values.len();

    // The gate guard moves into the blocking task, so an abandoned fit
    // still blocks the next fit for this key until it actually returns.
    let fit = async move {
        let guard = gate.lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            trainer.fit(&values)
        })
        .await
    };

    let fitted = match tokio::time::timeout(ctx.timeout, fit).await {
        Err(_) => Err(DetectorError::TrainingTimeout {
            key: key.clone(),
            timeout: ctx.timeout,
        }),
        Ok(Err(join_error)) => Err(DetectorError::TrainingFailure {
            key: key.clone(),
            source: ModelError::Fit(join_error.to_string()),
        }),
        Ok(Ok(Err(model_error))) => Err(DetectorError::TrainingFailure {
            key: key.clone(),
            source: model_error,
        }),
        Ok(Ok(Ok(model))) => Ok(model),
    };

    match fitted {
        Ok(model) => {
            let installed = entry.write(|slot| {
                if sample_count > slot.trained_at {
                    slot.model = Some(model);
                    slot.trained_at = sample_count;
                    slot.last_failure = None;
                    true
                } else {
                    false
                }
            });

            if !installed {
                debug!(key = %key, sample_count, "Discarding fit superseded by a newer model");
                return Ok(TrainingOutcome::Superseded { sample_count });
            }

            let elapsed = start.elapsed();
            ctx.metrics.record_training(elapsed.as_secs_f64());
            ctx.logger
                .log_model_trained(&key, sample_count, retained, elapsed.as_millis());
            if let Some(health) = &ctx.health {
                health.set_healthy(Component::Models).await;
            }
            Ok(TrainingOutcome::Trained { sample_count })
        }
        Err(err) => {
            let message = err.to_string();
            entry.write(|slot| slot.last_failure = Some(message.clone()));
            ctx.metrics.inc_training_failures();
            ctx.logger.log_training_failed(&key, sample_count, &message);
            // Degenerate series stay per-key; only trainer faults reach health
            let data_quality = matches!(
                &err,
                DetectorError::TrainingFailure { source, .. } if source.is_data_quality()
            );
            match &ctx.health {
                Some(health) if !data_quality => {
                    health.set_degraded(Component::Models, message).await
                }
                _ => {}
            }
            Err(err)
        }
    }
}
