//! Fingerprint Engine
//!
//! Derives a process's memory "DNA": a statistical summary of its history
//! window and a signature hash over the quantized summary. Quantizing before
//! hashing keeps the signature stable under sampling noise while materially
//! different behavior lands in different buckets.
//!
//! The engine is pure. Generations (current + one previous fingerprint, and
//! the feature vectors of older generations) live in a per-entity `Lineage`
//! owned by the caller.

use crate::analysis::regression::{self, growth_fit};
use crate::detect::LeakState;
use crate::error::MonitorResult;
use crate::history::{EntityId, Sample, BREAKDOWN_DATA, BREAKDOWN_SHARED, BREAKDOWN_STACK};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Bumped whenever the bucket layout changes, so old hashes never collide
const SIGNATURE_VERSION: u8 = 1;

/// Growth buckets beyond this magnitude collapse together
const MAX_GROWTH_BUCKET: i64 = 1000;

/// Bucket layout used before hashing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
    /// Mean RSS buckets per doubling of size (log2 scale)
    pub rss_buckets_per_octave: u32,
    /// Buckets over a coefficient of variation of [0, 1]; larger values share the top bucket
    pub variability_buckets: u32,
    /// Width of one growth-rate bucket (fraction per interval)
    pub growth_bucket_width: f64,
    /// Buckets over a complexity score of [0, 1]
    pub complexity_buckets: u32,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            rss_buckets_per_octave: 2,
            variability_buckets: 10,
            growth_bucket_width: 0.01,
            complexity_buckets: 5,
        }
    }
}

impl Quantization {
    /// Map a summary onto its bucket tuple
    pub fn buckets(&self, summary: &FingerprintSummary) -> SignatureBuckets {
        let per_octave = self.rss_buckets_per_octave.max(1) as f64;
        let rss = ((summary.mean_rss.max(0.0) + 1.0).log2() * per_octave).floor() as i64;

        let var_buckets = self.variability_buckets.max(1) as f64;
        let variability = (summary.variability.max(0.0) * var_buckets)
            .floor()
            .min(var_buckets) as i64;

        let width = if self.growth_bucket_width > 0.0 {
            self.growth_bucket_width
        } else {
            Quantization::default().growth_bucket_width
        };
        let growth = ((summary.growth_rate / width).floor() as i64)
            .clamp(-MAX_GROWTH_BUCKET, MAX_GROWTH_BUCKET);

        let cx_buckets = self.complexity_buckets.max(1) as f64;
        let complexity = (summary.complexity_score.clamp(0.0, 1.0) * cx_buckets)
            .floor()
            .min(cx_buckets - 1.0) as i64;

        SignatureBuckets {
            rss,
            variability,
            growth,
            complexity,
        }
    }
}

/// Quantized summary tuple that the signature hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureBuckets {
    pub rss: i64,
    pub variability: i64,
    pub growth: i64,
    pub complexity: i64,
}

impl SignatureBuckets {
    /// Stable content hash of the tuple
    pub fn signature(&self) -> u32 {
        let mut buf = [0u8; 33];
        buf[0] = SIGNATURE_VERSION;
        buf[1..9].copy_from_slice(&self.rss.to_le_bytes());
        buf[9..17].copy_from_slice(&self.variability.to_le_bytes());
        buf[17..25].copy_from_slice(&self.growth.to_le_bytes());
        buf[25..33].copy_from_slice(&self.complexity.to_le_bytes());
        crc32fast::hash(&buf)
    }
}

/// Average share of RSS per breakdown category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRatios {
    pub shared: f64,
    pub data: f64,
    pub stack: f64,
}

/// Statistical shape of a history window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FingerprintSummary {
    pub mean_rss: f64,
    pub std_rss: f64,
    pub mean_vms: f64,
    /// Coefficient of variation of RSS
    pub variability: f64,
    /// Fractional RSS growth per sampling interval
    pub growth_rate: f64,
    /// Normalized sign changes of the RSS first difference, in [0, 1]
    pub complexity_score: f64,
    /// Present when samples carried a breakdown
    pub breakdown: Option<BreakdownRatios>,
}

/// Feature vector fed to outlier scorers: mean, variability, growth, complexity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; 4]);

impl FeatureVector {
    pub const LEN: usize = 4;

    pub fn get(&self, idx: usize) -> f64 {
        self.0[idx]
    }
}

/// A generation of an entity's memory DNA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub entity_id: EntityId,
    /// 1-based generation number, 0 until adopted by a lineage
    pub generation: u64,
    /// Timestamp (ms) of the newest sample in the window
    pub computed_at: i64,
    pub sample_count: usize,
    pub summary: FingerprintSummary,
    pub buckets: SignatureBuckets,
    pub signature_hash: u32,
}

impl Fingerprint {
    pub fn signature_hex(&self) -> String {
        format!("{:08x}", self.signature_hash)
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.summary.mean_rss,
            self.summary.variability,
            self.summary.growth_rate,
            self.summary.complexity_score,
        ])
    }
}

/// Computes fingerprints from history windows
#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    sampling_interval: Duration,
    quantization: Quantization,
}

impl FingerprintEngine {
    pub fn new(sampling_interval: Duration, quantization: Quantization) -> Self {
        Self {
            sampling_interval,
            quantization,
        }
    }

    pub fn quantization(&self) -> &Quantization {
        &self.quantization
    }

    /// Fingerprint a history window (oldest first)
    ///
    /// Fails with `InsufficientHistory` below two samples.
    pub fn compute(&self, history: &[Sample]) -> MonitorResult<Fingerprint> {
        let growth = growth_fit(history, self.sampling_interval)?;

        let rss: Vec<f64> = history.iter().map(|s| s.resident_bytes as f64).collect();
        let vms: Vec<f64> = history.iter().map(|s| s.virtual_bytes as f64).collect();

        let summary = FingerprintSummary {
            mean_rss: growth.mean_rss,
            std_rss: regression::stddev(&rss),
            mean_vms: regression::mean(&vms),
            variability: regression::coefficient_of_variation(&rss),
            growth_rate: growth.growth_rate,
            complexity_score: complexity_score(&rss),
            breakdown: breakdown_ratios(history),
        };

        let buckets = self.quantization.buckets(&summary);
        let last = &history[history.len() - 1];

        Ok(Fingerprint {
            entity_id: last.entity_id,
            generation: 0,
            computed_at: last.timestamp,
            sample_count: history.len(),
            summary,
            buckets,
            signature_hash: buckets.signature(),
        })
    }
}

/// Sign changes of the first difference, normalized to [0, 1]
///
/// Flat steps are skipped when looking for a change of direction.
pub fn complexity_score(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }

    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let mut changes = 0usize;
    let mut last_sign = 0i8;

    for d in &diffs {
        let sign = if *d > 0.0 {
            1
        } else if *d < 0.0 {
            -1
        } else {
            continue;
        };
        if last_sign != 0 && sign != last_sign {
            changes += 1;
        }
        last_sign = sign;
    }

    changes as f64 / (diffs.len() - 1) as f64
}

fn breakdown_ratios(history: &[Sample]) -> Option<BreakdownRatios> {
    let mut shared = Vec::new();
    let mut data = Vec::new();
    let mut stack = Vec::new();

    for sample in history {
        if sample.resident_bytes == 0 || sample.breakdown.is_none() {
            continue;
        }
        let rss = sample.resident_bytes as f64;
        let ratio = |key: &str| sample.category_bytes(key).unwrap_or(0) as f64 / rss;
        shared.push(ratio(BREAKDOWN_SHARED));
        data.push(ratio(BREAKDOWN_DATA));
        stack.push(ratio(BREAKDOWN_STACK));
    }

    if shared.is_empty() {
        return None;
    }

    Some(BreakdownRatios {
        shared: regression::mean(&shared),
        data: regression::mean(&data),
        stack: regression::mean(&stack),
    })
}

/// Fingerprint generations of one entity
#[derive(Debug, Clone, Default)]
pub struct Lineage {
    current: Option<Fingerprint>,
    previous: Option<Fingerprint>,
    /// Features of generations older than `current`, oldest first
    past_features: VecDeque<FeatureVector>,
    feature_capacity: usize,
    samples_since_update: usize,
    generations: u64,
    fresh: bool,
    /// Leak-path streak bookkeeping
    pub leak: LeakState,
}

impl Lineage {
    pub fn new(feature_capacity: usize) -> Self {
        Self {
            feature_capacity: feature_capacity.max(1),
            ..Default::default()
        }
    }

    /// Resume from persisted fingerprints
    pub fn restored(
        feature_capacity: usize,
        current: Option<Fingerprint>,
        previous: Option<Fingerprint>,
    ) -> Self {
        let mut lineage = Self::new(feature_capacity);
        lineage.generations = current.as_ref().map(|f| f.generation).unwrap_or(0);
        if let Some(prev) = &previous {
            lineage.past_features.push_back(prev.features());
        }
        lineage.current = current;
        lineage.previous = previous;
        lineage
    }

    /// Count a new sample; true once `frequency` samples have arrived since the last generation
    pub fn note_sample(&mut self, frequency: usize) -> bool {
        self.fresh = false;
        self.samples_since_update += 1;
        self.samples_since_update >= frequency.max(1)
    }

    /// Adopt a freshly computed fingerprint as the next generation
    pub fn advance(&mut self, mut fingerprint: Fingerprint) -> &Fingerprint {
        self.generations += 1;
        fingerprint.generation = self.generations;

        if let Some(current) = self.current.take() {
            if self.past_features.len() >= self.feature_capacity {
                self.past_features.pop_front();
            }
            self.past_features.push_back(current.features());
            self.previous = Some(current);
        }

        self.samples_since_update = 0;
        self.fresh = true;
        self.current.insert(fingerprint)
    }

    pub fn current(&self) -> Option<&Fingerprint> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Fingerprint> {
        self.previous.as_ref()
    }

    /// Features of earlier generations (training data for outlier scoring)
    pub fn past_features(&self) -> Vec<FeatureVector> {
        self.past_features.iter().copied().collect()
    }

    pub fn generations(&self) -> u64 {
        self.generations
    }

    /// Whether the last `note_sample` was followed by a new generation
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Whether the signature moved between the last two generations
    pub fn signature_changed(&self) -> bool {
        match (&self.current, &self.previous) {
            (Some(cur), Some(prev)) => cur.signature_hash != prev.signature_hash,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FingerprintEngine {
        FingerprintEngine::new(Duration::from_secs(10), Quantization::default())
    }

    fn series(values: &[u64]) -> Vec<Sample> {
        let id = EntityId::process(7, 1);
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::with_timestamp(id, i as i64 * 10_000, v, 5.0))
            .collect()
    }

    #[test]
    fn test_requires_two_samples() {
        assert!(engine().compute(&series(&[100])).is_err());
        assert!(engine().compute(&series(&[100, 100])).is_ok());
    }

    #[test]
    fn test_constant_series_summary() {
        let fp = engine().compute(&series(&[4096; 12])).unwrap();
        assert_eq!(fp.summary.mean_rss, 4096.0);
        assert_eq!(fp.summary.variability, 0.0);
        assert_eq!(fp.summary.growth_rate, 0.0);
        assert_eq!(fp.summary.complexity_score, 0.0);
        assert_eq!(fp.sample_count, 12);
        assert_eq!(fp.computed_at, 110_000);
        assert_eq!(fp.signature_hex().len(), 8);
    }

    #[test]
    fn test_complexity_score_range() {
        // Monotonic: no direction changes
        assert_eq!(complexity_score(&[1.0, 2.0, 3.0, 4.0]), 0.0);
        // Alternating: every step reverses
        assert_eq!(complexity_score(&[1.0, 3.0, 1.0, 3.0, 1.0]), 1.0);
        // Flat steps are ignored when comparing directions
        let score = complexity_score(&[1.0, 2.0, 2.0, 1.0]);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sampling_noise_keeps_signature() {
        // ~1 MiB process with tiny jitter
        let a = engine()
            .compute(&series(&[1_000_000, 1_000_100, 1_000_000, 1_000_100, 1_000_000]))
            .unwrap();
        let b = engine()
            .compute(&series(&[1_000_050, 1_000_150, 1_000_050, 1_000_150, 1_000_050]))
            .unwrap();
        assert_eq!(a.buckets, b.buckets);
        assert_eq!(a.signature_hash, b.signature_hash);
    }

    #[test]
    fn test_quantization_within_bucket_is_stable() {
        let q = Quantization::default();
        let base = FingerprintSummary {
            mean_rss: 3_000_000.0,
            std_rss: 0.0,
            mean_vms: 0.0,
            variability: 0.25,
            growth_rate: 0.015,
            complexity_score: 0.5,
            breakdown: None,
        };
        let nudged = FingerprintSummary {
            mean_rss: 3_000_500.0,
            variability: 0.26,
            growth_rate: 0.016,
            complexity_score: 0.52,
            ..base
        };
        assert_eq!(q.buckets(&base).signature(), q.buckets(&nudged).signature());
    }

    #[test]
    fn test_quantization_across_buckets_changes_hash() {
        let q = Quantization::default();
        let base = FingerprintSummary {
            mean_rss: 3_000_000.0,
            std_rss: 0.0,
            mean_vms: 0.0,
            variability: 0.25,
            growth_rate: 0.015,
            complexity_score: 0.5,
            breakdown: None,
        };
        let base_hash = q.buckets(&base).signature();

        let variants = [
            FingerprintSummary { mean_rss: 12_000_000.0, ..base },
            FingerprintSummary { variability: 0.55, ..base },
            FingerprintSummary { growth_rate: 0.045, ..base },
            FingerprintSummary { complexity_score: 0.95, ..base },
        ];
        for variant in variants {
            assert_ne!(q.buckets(&variant).signature(), base_hash, "{:?}", variant);
        }
    }

    #[test]
    fn test_distinct_behaviors_distinct_hashes() {
        let steady = engine().compute(&series(&[500_000; 10])).unwrap();
        let leaking = engine()
            .compute(&series(&[
                500_000, 600_000, 700_000, 800_000, 900_000, 1_000_000, 1_100_000, 1_200_000,
                1_300_000, 1_400_000,
            ]))
            .unwrap();
        assert_ne!(steady.signature_hash, leaking.signature_hash);
        assert!(leaking.summary.growth_rate > 0.05);
    }

    #[test]
    fn test_breakdown_ratios() {
        let id = EntityId::process(1, 1);
        let history: Vec<Sample> = (0..3)
            .map(|i| {
                Sample::with_timestamp(id, i * 1000, 1000, 1.0)
                    .category(BREAKDOWN_SHARED, 250)
                    .category(BREAKDOWN_DATA, 500)
            })
            .collect();

        let fp = engine().compute(&history).unwrap();
        let ratios = fp.summary.breakdown.unwrap();
        assert!((ratios.shared - 0.25).abs() < 1e-12);
        assert!((ratios.data - 0.5).abs() < 1e-12);
        assert_eq!(ratios.stack, 0.0);

        assert!(engine().compute(&series(&[1, 2])).unwrap().summary.breakdown.is_none());
    }

    #[test]
    fn test_lineage_keeps_one_previous() {
        let engine = engine();
        let mut lineage = Lineage::new(5);

        for round in 0..3u64 {
            let fp = engine.compute(&series(&[100 * (round + 1), 120 * (round + 1)])).unwrap();
            lineage.advance(fp);
        }

        assert_eq!(lineage.generations(), 3);
        assert_eq!(lineage.current().unwrap().generation, 3);
        assert_eq!(lineage.previous().unwrap().generation, 2);
        assert_eq!(lineage.past_features().len(), 2);
        assert!(lineage.is_fresh());

        assert!(!lineage.note_sample(2));
        assert!(!lineage.is_fresh());
        assert!(lineage.note_sample(2));
    }

    #[test]
    fn test_lineage_feature_capacity() {
        let engine = engine();
        let mut lineage = Lineage::new(2);
        for round in 1..=5u64 {
            lineage.advance(engine.compute(&series(&[round * 10, round * 20])).unwrap());
        }
        assert_eq!(lineage.past_features().len(), 2);
    }
}
