//! Observability infrastructure for the anomaly detector
//!
//! Provides:
//! - Prometheus metrics (ingestion, training, prediction, distribution)
//! - Structured JSON logging with tracing

use crate::models::{SampleKey, Verdict};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct DetectorMetricsInner {
    samples_ingested: IntCounter,
    samples_rejected: IntCounter,
    predictions: IntCounterVec,
    anomalies_detected: IntCounter,
    training_runs: IntCounter,
    training_failures: IntCounter,
    training_latency_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    active_keys: IntGauge,
    active_subscribers: IntGauge,
    history_size: IntGauge,
    dropped_deliveries: IntCounter,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "anomaly_detector_samples_ingested_total",
                "Total number of samples appended to a time series"
            )
            .expect("Failed to register samples_ingested"),

            samples_rejected: register_int_counter!(
                "anomaly_detector_samples_rejected_total",
                "Total number of inbound records rejected as malformed"
            )
            .expect("Failed to register samples_rejected"),

            predictions: register_int_counter_vec!(
                "anomaly_detector_predictions_total",
                "Total number of predictions by verdict",
                &["verdict"]
            )
            .expect("Failed to register predictions"),

            anomalies_detected: register_int_counter!(
                "anomaly_detector_anomalies_detected_total",
                "Total number of samples classified as anomalous"
            )
            .expect("Failed to register anomalies_detected"),

            training_runs: register_int_counter!(
                "anomaly_detector_training_runs_total",
                "Total number of successful model fits"
            )
            .expect("Failed to register training_runs"),

            training_failures: register_int_counter!(
                "anomaly_detector_training_failures_total",
                "Total number of failed or timed out model fits"
            )
            .expect("Failed to register training_failures"),

            training_latency_seconds: register_histogram!(
                "anomaly_detector_training_latency_seconds",
                "Time spent fitting a model for one key",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register training_latency_seconds"),

            prediction_latency_seconds: register_histogram!(
                "anomaly_detector_prediction_latency_seconds",
                "Time spent scoring one value",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            active_keys: register_int_gauge!(
                "anomaly_detector_active_keys",
                "Number of keys with a time series"
            )
            .expect("Failed to register active_keys"),

            active_subscribers: register_int_gauge!(
                "anomaly_detector_active_subscribers",
                "Number of live subscribers to the prediction stream"
            )
            .expect("Failed to register active_subscribers"),

            history_size: register_int_gauge!(
                "anomaly_detector_history_size",
                "Number of records held for subscriber replay"
            )
            .expect("Failed to register history_size"),

            dropped_deliveries: register_int_counter!(
                "anomaly_detector_dropped_deliveries_total",
                "Records not delivered to a subscriber whose queue was full"
            )
            .expect("Failed to register dropped_deliveries"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new)
    }

    pub fn inc_samples_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    pub fn inc_samples_rejected(&self) {
        self.inner().samples_rejected.inc();
    }

    /// Count a prediction under its verdict label
    pub fn record_prediction(&self, verdict: Verdict, duration_secs: f64) {
        let inner = self.inner();
        inner
            .predictions
            .with_label_values(&[verdict.status()])
            .inc();
        inner.prediction_latency_seconds.observe(duration_secs);
        if verdict.is_anomaly() {
            inner.anomalies_detected.inc();
        }
    }

    pub fn record_training(&self, duration_secs: f64) {
        self.inner().training_runs.inc();
        self.inner().training_latency_seconds.observe(duration_secs);
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    pub fn set_active_keys(&self, count: i64) {
        self.inner().active_keys.set(count);
    }

    pub fn set_active_subscribers(&self, count: i64) {
        self.inner().active_subscribers.set(count);
    }

    pub fn set_history_size(&self, count: i64) {
        self.inner().history_size.set(count);
    }

    pub fn inc_dropped_deliveries(&self, count: u64) {
        self.inner().dropped_deliveries.inc_by(count);
    }
}

/// Structured logger for detector events
///
/// Provides consistent JSON-formatted logging for training, anomalies,
/// and subscriber lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a successful model fit
    pub fn log_model_trained(&self, key: &SampleKey, sample_count: u64, retained: usize, elapsed_ms: u128) {
        info!(
            event = "model_trained",
            instance = %self.instance,
            entity_id = key.entity_id,
            metric_kind = %key.metric_kind,
            sub_kind = ?key.sub_kind,
            sample_count = sample_count,
            retained = retained,
            elapsed_ms = elapsed_ms as u64,
            "Trained model"
        );
    }

    /// Log a failed fit; the previous model keeps serving
    pub fn log_training_failed(&self, key: &SampleKey, sample_count: u64, error: &str) {
        warn!(
            event = "model_training_failed",
            instance = %self.instance,
            entity_id = key.entity_id,
            metric_kind = %key.metric_kind,
            sub_kind = ?key.sub_kind,
            sample_count = sample_count,
            error = %error,
            "Model training failed, keeping previous model"
        );
    }

    /// Log an anomalous sample
    pub fn log_anomaly(&self, key: &SampleKey, value: f64) {
        info!(
            event = "anomaly_detected",
            instance = %self.instance,
            entity_id = key.entity_id,
            metric_kind = %key.metric_kind,
            sub_kind = ?key.sub_kind,
            value = value,
            "Anomaly detected"
        );
    }

    /// Log a rejected inbound record
    pub fn log_rejected(&self, index: usize, reason: &str) {
        warn!(
            event = "sample_rejected",
            instance = %self.instance,
            index = index,
            reason = %reason,
            "Rejected inbound record"
        );
    }

    pub fn log_subscriber_connected(&self, subscriber_id: u64, replayed: usize) {
        info!(
            event = "subscriber_connected",
            instance = %self.instance,
            subscriber_id = subscriber_id,
            replayed = replayed,
            "Subscriber connected"
        );
    }

    pub fn log_subscriber_disconnected(&self, subscriber_id: u64, reason: &str) {
        info!(
            event = "subscriber_disconnected",
            instance = %self.instance,
            subscriber_id = subscriber_id,
            reason = %reason,
            "Subscriber disconnected"
        );
    }

    /// Log detector startup
    pub fn log_startup(&self, version: &str, trainer: &str, retrain_interval: u64) {
        info!(
            event = "detector_started",
            instance = %self.instance,
            version = %version,
            trainer = %trainer,
            retrain_interval = retrain_interval,
            "Anomaly detector started"
        );
    }

    /// Log detector shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "detector_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Anomaly detector shutting down"
        );
    }
}
