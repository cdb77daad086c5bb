//! Per-key time series storage
//!
//! Each key owns a bounded ring of its most recent samples plus a
//! monotonic count of every sample ever appended. The count, not the ring
//! length, drives retraining, so retrain arithmetic stays exact after the
//! ring starts evicting.

use crate::models::{Sample, SampleKey};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Bounded, append-only series for one key
#[derive(Debug, Clone)]
pub struct TimeSeries {
    samples: VecDeque<Sample>,
    capacity: usize,
    total: u64,
}

impl TimeSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1_024)),
            capacity,
            total: 0,
        }
    }

    /// Append a sample, evicting the oldest at capacity; returns the new total count
    pub fn push(&mut self, sample: Sample) -> u64 {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total += 1;
        self.total
    }

    /// Samples appended over the lifetime of the series
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Samples currently retained
    pub fn retained(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained samples, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// Retained values, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }
}

/// Registry of time series keyed by sample key
pub struct TimeSeriesStore {
    series: DashMap<SampleKey, TimeSeries>,
    capacity: usize,
}

impl TimeSeriesStore {
    /// Create a store whose series retain at most `capacity` samples each
    pub fn new(capacity: usize) -> Self {
        Self {
            series: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append under the sample's key; returns the key's new total count
    pub fn append(&self, sample: Sample) -> u64 {
        let mut entry = self
            .series
            .entry(sample.key.clone())
            .or_insert_with(|| TimeSeries::new(self.capacity));
        entry.push(sample)
    }

    /// Retained samples for a key, oldest first
    pub fn snapshot(&self, key: &SampleKey) -> Vec<Sample> {
        self.series
            .get(key)
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    /// Retained values for a key, oldest first
    pub fn values(&self, key: &SampleKey) -> Vec<f64> {
        self.series.get(key).map(|s| s.values()).unwrap_or_default()
    }

    pub fn total_count(&self, key: &SampleKey) -> u64 {
        self.series.get(key).map(|s| s.total()).unwrap_or(0)
    }

    pub fn retained(&self, key: &SampleKey) -> usize {
        self.series.get(key).map(|s| s.retained()).unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<SampleKey> {
        self.series.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of keys with at least one sample
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
