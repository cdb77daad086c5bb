//! Isolation forest outlier scoring
//!
//! Builds an ensemble of random isolation trees over sub-samples of the
//! series. Values that isolate in few splits score close to 1.0; the
//! decision threshold is the `1 - contamination` quantile of the training
//! scores, so roughly `contamination` of the training data is flagged.

use super::{validate_series, AnomalyModel, ModelTrainer, Outlier};
use crate::error::ModelError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Euler-Mascheroni constant, used for harmonic number estimates
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fits [`IsolationForest`] models
#[derive(Debug, Clone)]
pub struct IsolationForestTrainer {
    pub n_trees: usize,
    /// Upper bound on the per-tree sub-sample size
    pub max_samples: usize,
    /// Expected share of outliers in the training data (0.0-0.5)
    pub contamination: f64,
    /// Seed for sub-sampling and split selection; equal inputs give equal models
    pub seed: u64,
}

impl Default for IsolationForestTrainer {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

impl IsolationForestTrainer {
    pub fn new(n_trees: usize, contamination: f64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            contamination: contamination.clamp(0.0, 0.5),
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit the concrete forest type
    pub fn fit_forest(&self, values: &[f64]) -> Result<IsolationForest, ModelError> {
        validate_series(values, 2)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.max_samples.max(2).min(values.len());
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..self.n_trees.max(1))
            .map(|_| {
                let subset: Vec<f64> = rand::seq::index::sample(&mut rng, values.len(), sample_size)
                    .into_iter()
                    .map(|i| values[i])
                    .collect();
                IsolationTree::build(subset, 0, height_limit, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            sample_size,
            threshold: f64::INFINITY,
        };

        let mut training_scores: Vec<f64> = values.iter().map(|v| forest.anomaly_score(*v)).collect();
        forest.threshold = quantile(&mut training_scores, 1.0 - self.contamination);
        Ok(forest)
    }
}

impl ModelTrainer for IsolationForestTrainer {
    fn fit(&self, values: &[f64]) -> Result<Arc<dyn AnomalyModel>, ModelError> {
        Ok(Arc::new(self.fit_forest(values)?))
    }

    fn name(&self) -> &'static str {
        "isolation_forest"
    }
}

#[derive(Debug)]
enum IsolationTree {
    Leaf {
        size: usize,
    },
    Split {
        at: f64,
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
}

impl IsolationTree {
    fn build(values: Vec<f64>, depth: usize, height_limit: usize, rng: &mut StdRng) -> Self {
        if depth >= height_limit || values.len() <= 1 {
            return IsolationTree::Leaf { size: values.len() };
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        if max <= min {
            return IsolationTree::Leaf { size: values.len() };
        }

        // Interpolate rather than sample `min..max`; the span may overflow to infinity
        let u: f64 = rng.random();
        let at = (min * (1.0 - u) + max * u).clamp(min, max);
        let (left, right): (Vec<f64>, Vec<f64>) = values.into_iter().partition(|v| *v < at);

        IsolationTree::Split {
            at,
            left: Box::new(Self::build(left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build(right, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(&self, value: f64) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                IsolationTree::Leaf { size } => return depth + average_path_length(*size),
                IsolationTree::Split { at, left, right } => {
                    node = if value < *at { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// A fitted isolation forest
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Anomaly score in (0, 1]; higher is more isolated
    pub fn anomaly_score(&self, value: f64) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(value)).sum::<f64>()
            / self.trees.len() as f64;
        let normaliser = average_path_length(self.sample_size);
        if normaliser <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / normaliser)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl AnomalyModel for IsolationForest {
    fn score(&self, value: f64) -> Result<Outlier, ModelError> {
        if !value.is_finite() {
            return Err(ModelError::Scoring("value is not finite".to_string()));
        }
        let score = self.anomaly_score(value);
        Ok(Outlier {
            is_outlier: score > self.threshold,
            score,
        })
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile, `q` in [0, 1]
fn quantile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::INFINITY;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    values[lower] + (values[upper] - values[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_spike() -> Vec<f64> {
        vec![1.0, 1.1, 1.2, 1.0, 1.1, 1.2, 1.0, 1.1, 1.2, 5.0]
    }

    #[test]
    fn test_far_value_is_outlier() {
        let forest = IsolationForestTrainer::default()
            .fit_forest(&clustered_with_spike())
            .unwrap();

        assert!(forest.score(1000.0).unwrap().is_outlier);
        assert!(!forest.score(1.1).unwrap().is_outlier);
    }

    #[test]
    fn test_isolated_points_score_higher() {
        let forest = IsolationForestTrainer::default()
            .fit_forest(&clustered_with_spike())
            .unwrap();
        assert!(forest.anomaly_score(5.0) > forest.anomaly_score(1.1));
    }

    #[test]
    fn test_fit_is_deterministic_for_a_seed() {
        let trainer = IsolationForestTrainer::default();
        let a = trainer.fit_forest(&clustered_with_spike()).unwrap();
        let b = trainer.fit_forest(&clustered_with_spike()).unwrap();
        assert_eq!(a.threshold(), b.threshold());
        assert_eq!(a.anomaly_score(3.0), b.anomaly_score(3.0));
    }

    #[test]
    fn test_fit_rejects_degenerate_series() {
        let trainer = IsolationForestTrainer::default();
        assert!(matches!(
            trainer.fit_forest(&[2.0; 10]),
            Err(ModelError::ZeroVariance)
        ));
        assert!(matches!(
            trainer.fit_forest(&[2.0]),
            Err(ModelError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_fit_handles_span_beyond_f64_range() {
        let values = [-1e308, 1e308, 0.0, 1.0, -1.0];
        let forest = IsolationForestTrainer::default().fit_forest(&values).unwrap();

        assert!(forest.threshold().is_finite());
        for value in values {
            let outlier = forest.score(value).unwrap();
            assert!(outlier.score > 0.0 && outlier.score <= 1.0);
        }
    }

    #[test]
    fn test_sub_sample_is_capped() {
        let values: Vec<f64> = (0..1_000).map(|i| (i % 37) as f64).collect();
        let forest = IsolationForestTrainer::new(10, 0.05)
            .fit_forest(&values)
            .unwrap();
        assert_eq!(forest.sample_size, 256);
        assert_eq!(forest.n_trees(), 10);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.24).abs() < 0.05);
    }

    #[test]
    fn test_quantile_interpolates() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&mut values, 0.0), 1.0);
        assert_eq!(quantile(&mut values, 1.0), 4.0);
        assert!((quantile(&mut values, 0.5) - 2.5).abs() < 1e-9);
    }
}
