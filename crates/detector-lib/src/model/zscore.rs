//! Standard-score outlier model
//!
//! Fits mean and sample standard deviation over the series and flags
//! values more than `threshold` standard deviations from the mean.

use super::{validate_series, AnomalyModel, ModelTrainer, Outlier};
use crate::error::ModelError;
use std::sync::Arc;

/// Fits [`ZScoreModel`]s
#[derive(Debug, Clone)]
pub struct ZScoreTrainer {
    /// Number of standard deviations to consider an outlier
    pub threshold: f64,
}

impl ZScoreTrainer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for ZScoreTrainer {
    fn default() -> Self {
        Self { threshold: 3.0 } // 3 sigma
    }
}

impl ModelTrainer for ZScoreTrainer {
    fn fit(&self, values: &[f64]) -> Result<Arc<dyn AnomalyModel>, ModelError> {
        validate_series(values, 2)?;

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        // Sample variance (Bessel's correction)
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
        let std_dev = variance.sqrt();

        if std_dev < f64::EPSILON {
            return Err(ModelError::ZeroVariance);
        }

        Ok(Arc::new(ZScoreModel {
            mean,
            std_dev,
            threshold: self.threshold,
        }))
    }

    fn name(&self) -> &'static str {
        "zscore"
    }
}

/// Mean / standard deviation model
#[derive(Debug, Clone)]
pub struct ZScoreModel {
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
}

impl AnomalyModel for ZScoreModel {
    fn score(&self, value: f64) -> Result<Outlier, ModelError> {
        if !value.is_finite() {
            return Err(ModelError::Scoring("value is not finite".to_string()));
        }
        let z = (value - self.mean) / self.std_dev;
        Ok(Outlier {
            is_outlier: z.abs() > self.threshold,
            score: z,
        })
    }
}
