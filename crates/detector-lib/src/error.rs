//! Error taxonomy for the detection engine
//!
//! Every variant is scoped to one sample, one key or one subscriber;
//! none of them is fatal to the process.

use crate::models::SampleKey;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by model fitting and scoring
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("need at least {required} samples to fit, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("series contains non-finite values")]
    NonFinite,

    #[error("series has zero variance")]
    ZeroVariance,

    #[error("fit failed: {0}")]
    Fit(String),

    #[error("scoring failed: {0}")]
    Scoring(String),
}

impl ModelError {
    /// Failures caused by the series itself rather than by the trainer
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            ModelError::InsufficientData { .. } | ModelError::NonFinite | ModelError::ZeroVariance
        )
    }
}

/// Errors surfaced by the ingestion pipeline and distribution hub
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Unroutable record or missing required field
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Model fit rejected the series; the previous model stays in place
    #[error("training failed for {key}: {source}")]
    TrainingFailure {
        key: SampleKey,
        #[source]
        source: ModelError,
    },

    #[error("training for {key} exceeded {timeout:?}")]
    TrainingTimeout { key: SampleKey, timeout: Duration },

    /// A subscriber sink errored or disconnected
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A model backend could not be reached for a single prediction
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl DetectorError {
    pub fn malformed(message: impl Into<String>) -> Self {
        DetectorError::MalformedInput(message.into())
    }

    /// Short machine-readable category for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorError::MalformedInput(_) => "malformed_input",
            DetectorError::TrainingFailure { .. } => "training_failure",
            DetectorError::TrainingTimeout { .. } => "training_timeout",
            DetectorError::TransportFailure(_) => "transport_failure",
            DetectorError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

pub type Result<T, E = DetectorError> = std::result::Result<T, E>;
