//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of samples between retrains
pub const DEFAULT_RETRAIN_INTERVAL: u64 = 10;

/// Default number of samples retained per key for training
pub const DEFAULT_SERIES_CAPACITY: usize = 1_000;

/// Default number of records kept for subscriber replay
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default per-subscriber live queue depth
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Where retraining runs relative to the ingestion path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    /// Fit before the triggering sample is scored
    #[default]
    Inline,
    /// Fit on a blocking task; scoring keeps the last completed model
    Background,
}

/// Verdict returned for a key that has no trained model yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartPolicy {
    #[default]
    Unknown,
    Normal,
}

/// Configuration for the detection engine
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Retrain whenever a key's sample count reaches a multiple of this
    pub retrain_interval: u64,
    /// Maximum samples retained per key (ring buffer)
    pub series_capacity: usize,
    /// Records kept in the distribution history
    pub history_capacity: usize,
    /// Live queue depth per subscriber before records are dropped for it
    pub subscriber_queue: usize,
    /// Upper bound on a single model fit
    pub training_timeout: Duration,
    pub training_mode: TrainingMode,
    pub cold_start: ColdStartPolicy,
    /// Upper bound on delivering one record to one sink
    pub send_timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            retrain_interval: DEFAULT_RETRAIN_INTERVAL,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            training_timeout: Duration::from_secs(5),
            training_mode: TrainingMode::Inline,
            cold_start: ColdStartPolicy::Unknown,
            send_timeout: Duration::from_secs(2),
        }
    }
}

impl DetectorConfig {
    /// Clamp values that would break retrain arithmetic or the ring buffers
    pub fn sanitized(mut self) -> Self {
        self.retrain_interval = self.retrain_interval.max(1);
        self.series_capacity = self.series_capacity.max(1);
        self.history_capacity = self.history_capacity.max(1);
        self.subscriber_queue = self.subscriber_queue.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_config_default() {
        let config = DetectorConfig::default();
        assert_eq!(config.retrain_interval, 10);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.training_mode, TrainingMode::Inline);
        assert_eq!(config.cold_start, ColdStartPolicy::Unknown);
    }

    #[test]
    fn test_sanitized_rejects_zero_interval() {
        let config = DetectorConfig {
            retrain_interval: 0,
            series_capacity: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.retrain_interval, 1);
        assert_eq!(config.series_capacity, 1);
    }

    #[test]
    fn test_policies_deserialize_lowercase() {
        let mode: TrainingMode = serde_json::from_str("\"background\"").unwrap();
        assert_eq!(mode, TrainingMode::Background);
        let policy: ColdStartPolicy = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(policy, ColdStartPolicy::Normal);
    }
}
