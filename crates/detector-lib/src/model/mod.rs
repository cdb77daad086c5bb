//! Pluggable anomaly models
//!
//! A [`ModelTrainer`] fits an [`AnomalyModel`] on the value column of a
//! series; the model then classifies single values as inliers or outliers.
//! Any pair satisfying this contract can back the model lifecycle.

mod isolation_forest;
mod zscore;

pub use isolation_forest::{IsolationForest, IsolationForestTrainer};
pub use zscore::{ZScoreModel, ZScoreTrainer};

use crate::error::ModelError;
use std::sync::Arc;

/// Binary outlier signal plus the raw score behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outlier {
    pub is_outlier: bool,
    pub score: f64,
}

/// A fitted model that can score single values
pub trait AnomalyModel: Send + Sync {
    fn score(&self, value: f64) -> Result<Outlier, ModelError>;
}

/// Fits fresh models from a series' values
pub trait ModelTrainer: Send + Sync {
    /// Fit a new model on `values` (oldest first)
    fn fit(&self, values: &[f64]) -> Result<Arc<dyn AnomalyModel>, ModelError>;

    /// Short identifier reported by introspection endpoints
    fn name(&self) -> &'static str;
}

/// Reject series no model can be fitted on
pub(crate) fn validate_series(values: &[f64], min_samples: usize) -> Result<(), ModelError> {
    if values.len() < min_samples {
        return Err(ModelError::InsufficientData {
            required: min_samples,
            actual: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    let first = values[0];
    if values.iter().all(|v| *v == first) {
        return Err(ModelError::ZeroVariance);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_series() {
        assert_eq!(
            validate_series(&[1.0], 2),
            Err(ModelError::InsufficientData {
                required: 2,
                actual: 1
            })
        );
        assert_eq!(validate_series(&[1.0, f64::INFINITY], 2), Err(ModelError::NonFinite));
        assert_eq!(validate_series(&[4.0, 4.0, 4.0], 2), Err(ModelError::ZeroVariance));
        assert!(validate_series(&[1.0, 2.0], 2).is_ok());
    }
}
