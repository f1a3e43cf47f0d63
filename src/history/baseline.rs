//! Rolling baseline statistics
//!
//! Welford-style running mean/variance that supports both adding a value and
//! removing an evicted one, so the baseline always describes the current ring
//! without a full recompute.

use crate::history::types::{Sample, BREAKDOWN_DATA, BREAKDOWN_SHARED, BREAKDOWN_STACK};
use serde::{Deserialize, Serialize};

/// Running mean and (population) variance of one metric
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the mean
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build stats directly from known moments
    pub fn from_moments(count: u64, mean: f64, stddev: f64) -> Self {
        Self {
            count,
            mean,
            m2: stddev * stddev * count as f64,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Remove a value that was previously pushed
    pub fn remove(&mut self, value: f64) {
        match self.count {
            0 => {}
            1 => *self = Self::default(),
            n => {
                let old_mean = self.mean;
                self.mean = (n as f64 * old_mean - value) / (n - 1) as f64;
                self.m2 -= (value - old_mean) * (value - self.mean);
                if self.m2 < 0.0 {
                    self.m2 = 0.0;
                }
                self.count = n - 1;
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard score of `value`, or `None` when the spread is zero
    pub fn z_score(&self, value: f64) -> Option<f64> {
        let stddev = self.stddev();
        if self.count == 0 || stddev <= f64::EPSILON {
            return None;
        }
        Some((value - self.mean) / stddev)
    }
}

/// Per-entity baseline over the absolute and ratio metrics
///
/// Ratio stats only see samples that carry the underlying fields, so their
/// counts can trail `count()`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Baseline {
    /// Resident bytes (absolute metric)
    pub resident: RunningStats,
    /// Percent of total memory
    pub percent: RunningStats,
    /// Resident over virtual size
    #[serde(default)]
    pub memory_ratio: RunningStats,
    /// Shared pages over resident bytes
    #[serde(default)]
    pub shared_ratio: RunningStats,
    /// Data segment over resident bytes
    #[serde(default)]
    pub data_ratio: RunningStats,
    /// Stack segment over resident bytes
    #[serde(default)]
    pub stack_ratio: RunningStats,
}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a full sample window (only used on history reset/restore)
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut baseline = Self::new();
        for sample in samples {
            baseline.observe(sample);
        }
        baseline
    }

    fn ratio_stats(&mut self, sample: &Sample) -> [(&mut RunningStats, Option<f64>); 4] {
        [
            (&mut self.memory_ratio, sample.memory_ratio()),
            (&mut self.shared_ratio, sample.breakdown_ratio(BREAKDOWN_SHARED)),
            (&mut self.data_ratio, sample.breakdown_ratio(BREAKDOWN_DATA)),
            (&mut self.stack_ratio, sample.breakdown_ratio(BREAKDOWN_STACK)),
        ]
    }

    pub fn observe(&mut self, sample: &Sample) {
        self.resident.push(sample.resident_bytes as f64);
        self.percent.push(sample.percent_of_total);
        for (stats, value) in self.ratio_stats(sample) {
            if let Some(value) = value {
                stats.push(value);
            }
        }
    }

    pub fn evict(&mut self, sample: &Sample) {
        self.resident.remove(sample.resident_bytes as f64);
        self.percent.remove(sample.percent_of_total);
        for (stats, value) in self.ratio_stats(sample) {
            if let Some(value) = value {
                stats.remove(value);
            }
        }
    }

    /// Number of samples the baseline covers
    pub fn count(&self) -> u64 {
        self.resident.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::EntityId;

    fn naive(values: &[f64]) -> (f64, f64) {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        (mean, var.sqrt())
    }

    #[test]
    fn test_push_matches_naive() {
        let values = [10.0, 12.0, 9.0, 15.0, 11.0];
        let mut stats = RunningStats::new();
        for v in values {
            stats.push(v);
        }

        let (mean, sd) = naive(&values);
        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - mean).abs() < 1e-9);
        assert!((stats.stddev() - sd).abs() < 1e-9);
    }

    #[test]
    fn test_remove_tracks_sliding_window() {
        let mut stats = RunningStats::new();
        for v in [5.0, 7.0, 9.0, 11.0] {
            stats.push(v);
        }
        stats.remove(5.0);

        let (mean, sd) = naive(&[7.0, 9.0, 11.0]);
        assert_eq!(stats.count(), 3);
        assert!((stats.mean() - mean).abs() < 1e-9);
        assert!((stats.stddev() - sd).abs() < 1e-9);
    }

    #[test]
    fn test_remove_last_value_resets() {
        let mut stats = RunningStats::new();
        stats.push(3.0);
        stats.remove(3.0);
        assert_eq!(stats, RunningStats::default());
    }

    #[test]
    fn test_z_score_guards_zero_spread() {
        let mut stats = RunningStats::new();
        for _ in 0..5 {
            stats.push(100.0);
        }
        assert_eq!(stats.z_score(500.0), None);

        let stats = RunningStats::from_moments(20, 1000.0, 100.0);
        assert!((stats.z_score(1300.0).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_from_samples() {
        let id = EntityId::process(1, 1);
        let samples: Vec<Sample> = (0..4)
            .map(|i| Sample::with_timestamp(id, i, 100 * (i as u64 + 1), 10.0))
            .collect();

        let baseline = Baseline::from_samples(&samples);
        assert_eq!(baseline.count(), 4);
        assert!((baseline.resident.mean() - 250.0).abs() < 1e-9);
        assert_eq!(baseline.percent.stddev(), 0.0);
    }

    #[test]
    fn test_ratio_stats_follow_breakdowns() {
        let id = EntityId::process(2, 2);
        let plain = Sample::with_timestamp(id, 0, 1000, 1.0).virtual_bytes(4000);
        let detailed = Sample::with_timestamp(id, 1, 1000, 1.0)
            .virtual_bytes(2000)
            .category(BREAKDOWN_SHARED, 300)
            .category(BREAKDOWN_DATA, 500);

        let mut baseline = Baseline::new();
        baseline.observe(&plain);
        baseline.observe(&detailed);

        assert_eq!(baseline.count(), 2);
        assert_eq!(baseline.memory_ratio.count(), 2);
        assert!((baseline.memory_ratio.mean() - 0.375).abs() < 1e-12);
        assert_eq!(baseline.shared_ratio.count(), 1);
        assert!((baseline.data_ratio.mean() - 0.5).abs() < 1e-12);
        assert_eq!(baseline.stack_ratio.mean(), 0.0);

        baseline.evict(&detailed);
        assert_eq!(baseline.shared_ratio.count(), 0);
        assert_eq!(baseline.memory_ratio.count(), 1);
        assert!((baseline.memory_ratio.mean() - 0.25).abs() < 1e-12);
    }
}
