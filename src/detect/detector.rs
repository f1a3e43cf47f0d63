//! Anomaly Detector
//!
//! Three paths, all evaluated and merged:
//!
//! - **deviation**: z-score of the latest sample against the pre-sample
//!   baseline (SPIKE for resident bytes, RATIO_DEVIATION for percent of
//!   total, resident/virtual and the breakdown shares of resident)
//! - **leak**: fitted growth across the window above threshold, sustained
//!   across consecutive fingerprint generations (MEMORY_LEAK, latched per
//!   entity)
//! - **drift**: optional outlier scoring of the current feature vector
//!   against the entity's past generations (PATTERN_DRIFT)
//!
//! The first two are fully deterministic given the same history.

use crate::analysis::{Lineage, TrendEstimator};
use crate::detect::scorer::{judge, OutlierScorer};
use crate::history::{
    Baseline, Entity, EntityId, RunningStats, Sample, BREAKDOWN_DATA, BREAKDOWN_SHARED,
    BREAKDOWN_STACK,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// |z| at or above this is HIGH, below it MEDIUM
pub const HIGH_DEVIATION: f64 = 3.0;

/// Anomaly classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    MemoryLeak,
    Spike,
    RatioDeviation,
    PatternDrift,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::MemoryLeak => "MEMORY_LEAK",
            AnomalyKind::Spike => "SPIKE",
            AnomalyKind::RatioDeviation => "RATIO_DEVIATION",
            AnomalyKind::PatternDrift => "PATTERN_DRIFT",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity, ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Metric a deviation was measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    /// Absolute metric
    ResidentBytes,
    PercentOfTotal,
    /// Resident over virtual size
    MemoryRatio,
    SharedRatio,
    DataRatio,
    StackRatio,
}

impl MetricField {
    fn kind(&self) -> AnomalyKind {
        match self {
            MetricField::ResidentBytes => AnomalyKind::Spike,
            _ => AnomalyKind::RatioDeviation,
        }
    }
}

/// Numbers backing a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Deviation {
        metric: MetricField,
        observed: f64,
        mean: f64,
        stddev: f64,
        z_score: f64,
    },
    Growth {
        /// Fitted fractional growth across the window
        window_growth: f64,
        /// Fractional growth per sampling interval
        growth_rate: f64,
        threshold: f64,
        /// Consecutive generations above threshold
        generations: u32,
        time_to_threshold_secs: Option<f64>,
    },
    Outlier {
        scorer: String,
        score: f64,
        cutoff: f64,
        signature_changed: bool,
    },
}

/// An immutable anomaly verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub entity_id: EntityId,
    pub entity_name: String,
    /// Timestamp (ms) of the sample that triggered the verdict
    pub detected_at: i64,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub evidence: Evidence,
}

impl fmt::Display for AnomalyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} for {} ({}) at {}",
            self.severity, self.kind, self.entity_name, self.entity_id, self.detected_at
        )
    }
}

/// Per-entity leak streak, carried in the entity's `Lineage`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakState {
    /// Consecutive generations above the growth threshold
    pub streak: u32,
    /// Severity already reported for the current streak
    pub reported: Option<Severity>,
}

/// Detector thresholds
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub z_threshold: f64,
    /// Baseline samples required before the deviation path runs
    pub min_baseline_samples: u64,
    /// Fractional growth across one window that counts toward a leak
    pub leak_growth_threshold: f64,
    /// Window growth at or above this makes a leak HIGH
    pub leak_high_threshold: f64,
    /// Consecutive generations required for a leak
    pub leak_generations: u32,
    pub contamination_rate: f64,
    /// Past generations required before drift scoring
    pub min_fingerprints: usize,
    /// Share of total memory used for the leak's time-to-threshold evidence
    pub threshold_fraction: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.0,
            min_baseline_samples: 5,
            leak_growth_threshold: 0.05,
            leak_high_threshold: 0.10,
            leak_generations: 2,
            contamination_rate: 0.1,
            min_fingerprints: 10,
            threshold_fraction: 0.9,
        }
    }
}

/// Scores samples and fingerprints into anomaly records
pub struct AnomalyDetector {
    config: DetectorConfig,
    trend: TrendEstimator,
    scorer: Option<Arc<dyn OutlierScorer>>,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig, trend: TrendEstimator) -> Self {
        Self {
            config,
            trend,
            scorer: None,
        }
    }

    /// Enable the drift path with an outlier scorer
    pub fn with_scorer(mut self, scorer: Arc<dyn OutlierScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn scorer_name(&self) -> Option<&str> {
        self.scorer.as_deref().map(|s| s.name())
    }

    /// Evaluate the latest sample
    ///
    /// `baseline` is the entity's baseline before `latest` was recorded;
    /// `history` is the window ending with `latest`. The leak and drift
    /// paths only run when `lineage` has just advanced a generation.
    pub fn evaluate(
        &self,
        entity: &Entity,
        latest: &Sample,
        baseline: &Baseline,
        history: &[Sample],
        lineage: &mut Lineage,
    ) -> Vec<AnomalyRecord> {
        let mut records = Vec::new();

        let metrics = [
            (MetricField::ResidentBytes, &baseline.resident, Some(latest.resident_bytes as f64)),
            (MetricField::PercentOfTotal, &baseline.percent, Some(latest.percent_of_total)),
            (MetricField::MemoryRatio, &baseline.memory_ratio, latest.memory_ratio()),
            (
                MetricField::SharedRatio,
                &baseline.shared_ratio,
                latest.breakdown_ratio(BREAKDOWN_SHARED),
            ),
            (MetricField::DataRatio, &baseline.data_ratio, latest.breakdown_ratio(BREAKDOWN_DATA)),
            (
                MetricField::StackRatio,
                &baseline.stack_ratio,
                latest.breakdown_ratio(BREAKDOWN_STACK),
            ),
        ];
        for (metric, stats, value) in metrics {
            let Some(value) = value else { continue };
            if stats.count() < self.config.min_baseline_samples {
                continue;
            }
            if let Some((severity, evidence)) = self.check_deviation(metric, stats, value) {
                records.push(self.record(entity, latest, metric.kind(), severity, evidence));
            }
        }

        if lineage.is_fresh() {
            if let Some(record) = self.check_leak(entity, latest, history, lineage) {
                records.push(record);
            }
            if let Some(record) = self.check_drift(entity, latest, lineage) {
                records.push(record);
            }
        }

        records
    }

    /// Z-score test of one value against running stats
    ///
    /// Zero spread is never anomalous.
    pub fn check_deviation(
        &self,
        metric: MetricField,
        stats: &RunningStats,
        value: f64,
    ) -> Option<(Severity, Evidence)> {
        let z = stats.z_score(value)?;
        if z.abs() <= self.config.z_threshold {
            return None;
        }

        let severity = if z.abs() >= HIGH_DEVIATION {
            Severity::High
        } else {
            Severity::Medium
        };

        Some((
            severity,
            Evidence::Deviation {
                metric,
                observed: value,
                mean: stats.mean(),
                stddev: stats.stddev(),
                z_score: z,
            },
        ))
    }

    fn check_leak(
        &self,
        entity: &Entity,
        latest: &Sample,
        history: &[Sample],
        lineage: &mut Lineage,
    ) -> Option<AnomalyRecord> {
        let projection = match self.trend.project(history, self.config.threshold_fraction) {
            Ok(projection) => projection,
            Err(e) => {
                tracing::debug!(entity = %entity.id, error = %e, "Skipping leak check");
                return None;
            }
        };
        let window_growth = projection.window_growth;

        let state = &mut lineage.leak;
        if window_growth <= self.config.leak_growth_threshold {
            *state = LeakState::default();
            return None;
        }

        state.streak += 1;
        if state.streak < self.config.leak_generations.max(1) {
            return None;
        }

        let severity = if window_growth >= self.config.leak_high_threshold {
            Severity::High
        } else {
            Severity::Medium
        };
        if state.reported.is_some_and(|r| r >= severity) {
            return None;
        }
        state.reported = Some(severity);
        let generations = state.streak;

        Some(self.record(
            entity,
            latest,
            AnomalyKind::MemoryLeak,
            severity,
            Evidence::Growth {
                window_growth,
                growth_rate: projection.growth_rate,
                threshold: self.config.leak_growth_threshold,
                generations,
                time_to_threshold_secs: projection
                    .estimated_time_to_threshold
                    .map(|d| d.as_secs_f64()),
            },
        ))
    }

    fn check_drift(
        &self,
        entity: &Entity,
        latest: &Sample,
        lineage: &Lineage,
    ) -> Option<AnomalyRecord> {
        let scorer = self.scorer.as_deref()?;
        let current = lineage.current()?;

        let training = lineage.past_features();
        if training.len() < self.config.min_fingerprints {
            tracing::debug!(
                entity = %entity.id,
                available = training.len(),
                required = self.config.min_fingerprints,
                "Drift scorer undertrained"
            );
            return None;
        }

        let verdict = match judge(
            scorer,
            &training,
            &current.features(),
            self.config.contamination_rate,
        ) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::debug!(entity = %entity.id, error = %e, "Drift scoring skipped");
                return None;
            }
        };

        if !verdict.is_outlier {
            return None;
        }

        let signature_changed = lineage.signature_changed();
        let severity = if signature_changed {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(self.record(
            entity,
            latest,
            AnomalyKind::PatternDrift,
            severity,
            Evidence::Outlier {
                scorer: scorer.name().to_string(),
                score: verdict.score,
                cutoff: verdict.cutoff,
                signature_changed,
            },
        ))
    }

    fn record(
        &self,
        entity: &Entity,
        latest: &Sample,
        kind: AnomalyKind,
        severity: Severity,
        evidence: Evidence,
    ) -> AnomalyRecord {
        AnomalyRecord {
            entity_id: entity.id,
            entity_name: entity.name.clone(),
            detected_at: latest.timestamp,
            kind,
            severity,
            evidence,
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default(), TrendEstimator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{FingerprintEngine, Quantization};
    use crate::detect::scorer::StatisticalScorer;
    use std::time::Duration;

    fn entity() -> Entity {
        Entity::new(EntityId::process(11, 500), "svc")
    }

    fn baseline_of(mean: f64, stddev: f64) -> Baseline {
        Baseline {
            resident: RunningStats::from_moments(10, mean, stddev),
            percent: RunningStats::from_moments(10, 5.0, 0.0),
            ..Default::default()
        }
    }

    fn sample(rss: u64) -> Sample {
        Sample::with_timestamp(entity().id, 100_000, rss, 5.0)
    }

    #[test]
    fn test_deviation_three_sigma_is_high() {
        let detector = AnomalyDetector::default();
        let mut lineage = Lineage::new(10);
        let latest = sample(1300);

        let records = detector.evaluate(
            &entity(),
            &latest,
            &baseline_of(1000.0, 100.0),
            &[latest.clone()],
            &mut lineage,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AnomalyKind::Spike);
        assert_eq!(records[0].severity, Severity::High);
        match &records[0].evidence {
            Evidence::Deviation { z_score, .. } => assert!((z_score - 3.0).abs() < 1e-12),
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_deviation_below_threshold_is_quiet() {
        let detector = AnomalyDetector::default();
        let mut lineage = Lineage::new(10);
        let latest = sample(1150);

        let records = detector.evaluate(
            &entity(),
            &latest,
            &baseline_of(1000.0, 100.0),
            &[latest.clone()],
            &mut lineage,
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_deviation_medium_band() {
        let detector = AnomalyDetector::default();
        let stats = RunningStats::from_moments(10, 1000.0, 100.0);
        let (severity, _) = detector
            .check_deviation(MetricField::ResidentBytes, &stats, 750.0)
            .unwrap();
        assert_eq!(severity, Severity::Medium);
    }

    #[test]
    fn test_ratio_metric_is_ratio_deviation() {
        let detector = AnomalyDetector::default();
        let mut lineage = Lineage::new(10);
        let baseline = Baseline {
            resident: RunningStats::from_moments(10, 1000.0, 0.0),
            percent: RunningStats::from_moments(10, 10.0, 1.0),
            ..Default::default()
        };
        let latest = Sample::with_timestamp(entity().id, 1, 1000, 12.5);

        let records =
            detector.evaluate(&entity(), &latest, &baseline, &[latest.clone()], &mut lineage);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AnomalyKind::RatioDeviation);
        assert_eq!(records[0].severity, Severity::Medium);
    }

    #[test]
    fn test_resident_to_virtual_ratio_deviation() {
        let detector = AnomalyDetector::default();
        let mut lineage = Lineage::new(10);
        let baseline = Baseline {
            memory_ratio: RunningStats::from_moments(10, 0.5, 0.05),
            ..baseline_of(1000.0, 0.0)
        };
        // All of virtual now resident
        let latest = sample(1000).virtual_bytes(1000);

        let records =
            detector.evaluate(&entity(), &latest, &baseline, &[latest.clone()], &mut lineage);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AnomalyKind::RatioDeviation);
        assert_eq!(records[0].severity, Severity::High);
        assert!(matches!(
            records[0].evidence,
            Evidence::Deviation {
                metric: MetricField::MemoryRatio,
                ..
            }
        ));
    }

    #[test]
    fn test_breakdown_ratio_deviation() {
        let detector = AnomalyDetector::default();
        let mut lineage = Lineage::new(10);
        let baseline = Baseline {
            shared_ratio: RunningStats::from_moments(10, 0.10, 0.02),
            // Too few breakdown samples to judge
            stack_ratio: RunningStats::from_moments(3, 0.01, 0.001),
            ..baseline_of(1000.0, 0.0)
        };
        let latest = sample(1000)
            .category(BREAKDOWN_SHARED, 150)
            .category(BREAKDOWN_STACK, 500);

        let records =
            detector.evaluate(&entity(), &latest, &baseline, &[latest.clone()], &mut lineage);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AnomalyKind::RatioDeviation);
        assert_eq!(records[0].severity, Severity::Medium);
        match &records[0].evidence {
            Evidence::Deviation {
                metric, z_score, ..
            } => {
                assert_eq!(*metric, MetricField::SharedRatio);
                assert!((z_score - 2.5).abs() < 1e-9);
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_zero_stddev_never_anomalous() {
        let detector = AnomalyDetector::default();
        let stats = RunningStats::from_moments(10, 1000.0, 0.0);
        assert!(detector
            .check_deviation(MetricField::ResidentBytes, &stats, 1_000_000.0)
            .is_none());
    }

    #[test]
    fn test_warm_up_skips_deviation() {
        let detector = AnomalyDetector::default();
        let mut lineage = Lineage::new(10);
        let baseline = Baseline {
            resident: RunningStats::from_moments(3, 1000.0, 100.0),
            percent: RunningStats::from_moments(3, 5.0, 0.0),
            ..Default::default()
        };
        let latest = sample(5000);
        let records =
            detector.evaluate(&entity(), &latest, &baseline, &[latest.clone()], &mut lineage);
        assert!(records.is_empty());
    }

    /// Ten samples rising linearly by `step` of `start` per interval
    ///
    /// Fitted growth across the window is `9 * step / (1 + 4.5 * step)`.
    fn window(start_idx: i64, start: f64, step: f64) -> Vec<Sample> {
        (0..10)
            .map(|i| {
                let rss = start * (1.0 + step * i as f64);
                Sample::with_timestamp(entity().id, (start_idx + i) * 10_000, rss as u64, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_leak_latched_across_generations() {
        let detector = AnomalyDetector::default();
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(10);

        let mut leaks = Vec::new();
        for generation in 0..4i64 {
            let history = window(generation * 10, 1_000_000.0, 0.02);
            lineage.advance(engine.compute(&history).unwrap());
            let latest = history[9].clone();
            let records =
                detector.evaluate(&entity(), &latest, &Baseline::new(), &history, &mut lineage);
            leaks.extend(records.into_iter().filter(|r| r.kind == AnomalyKind::MemoryLeak));
        }

        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].severity, Severity::High);
        match &leaks[0].evidence {
            Evidence::Growth {
                generations,
                window_growth,
                growth_rate,
                ..
            } => {
                assert_eq!(*generations, 2);
                assert!((*window_growth - 0.18 / 1.09).abs() < 1e-3);
                // Two percent of the starting size per interval
                assert!(*growth_rate < 0.05);
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_slow_per_interval_growth_still_leaks_over_window() {
        let detector = AnomalyDetector::default();
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(10);

        // ~1.3% per interval, ~12% across the window
        let mut leaks = Vec::new();
        for generation in 0..2i64 {
            let history = window(generation * 10, 1_000_000.0, 0.014);
            lineage.advance(engine.compute(&history).unwrap());
            assert!(lineage.current().unwrap().summary.growth_rate < 0.05);
            leaks.extend(
                detector
                    .evaluate(&entity(), &history[9], &Baseline::new(), &history, &mut lineage)
                    .into_iter()
                    .filter(|r| r.kind == AnomalyKind::MemoryLeak),
            );
        }
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].severity, Severity::High);
    }

    #[test]
    fn test_leak_escalation_re_emits() {
        let detector = AnomalyDetector::default();
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(10);

        // ~7% across the window twice (MEDIUM), then ~16% (HIGH)
        let steps = [0.008, 0.008, 0.02];
        let mut severities = Vec::new();
        for (g, step) in steps.iter().enumerate() {
            let history = window(g as i64 * 10, 1_000_000.0, *step);
            lineage.advance(engine.compute(&history).unwrap());
            let latest = history[9].clone();
            for r in detector.evaluate(&entity(), &latest, &Baseline::new(), &history, &mut lineage) {
                if r.kind == AnomalyKind::MemoryLeak {
                    severities.push(r.severity);
                }
            }
        }
        assert_eq!(severities, vec![Severity::Medium, Severity::High]);
    }

    #[test]
    fn test_leak_streak_resets_on_flat_window() {
        let detector = AnomalyDetector::default();
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(10);

        let history = window(0, 1_000_000.0, 0.02);
        lineage.advance(engine.compute(&history).unwrap());
        detector.evaluate(&entity(), &history[9], &Baseline::new(), &history, &mut lineage);
        assert_eq!(lineage.leak.streak, 1);

        let flat = window(10, 1_000_000.0, 0.0);
        lineage.advance(engine.compute(&flat).unwrap());
        detector.evaluate(&entity(), &flat[9], &Baseline::new(), &flat, &mut lineage);
        assert_eq!(lineage.leak, LeakState::default());
    }

    #[test]
    fn test_leak_path_waits_for_fresh_generation() {
        let detector = AnomalyDetector::default();
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(10);

        let history = window(0, 1_000_000.0, 0.02);
        lineage.advance(engine.compute(&history).unwrap());
        lineage.note_sample(10);

        detector.evaluate(&entity(), &history[9], &Baseline::new(), &history, &mut lineage);
        assert_eq!(lineage.leak.streak, 0);
    }

    #[test]
    fn test_drift_skipped_when_undertrained() {
        let detector =
            AnomalyDetector::default().with_scorer(Arc::new(StatisticalScorer::new()));
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(20);

        for g in 0..3i64 {
            let history = window(g * 10, 1_000_000.0, 0.0);
            lineage.advance(engine.compute(&history).unwrap());
        }
        let spike = window(30, 50_000_000.0, 0.02);
        lineage.advance(engine.compute(&spike).unwrap());

        let records =
            detector.evaluate(&entity(), &spike[9], &Baseline::new(), &spike, &mut lineage);
        assert!(records.iter().all(|r| r.kind != AnomalyKind::PatternDrift));
    }

    #[test]
    fn test_drift_detected_with_trained_scorer() {
        let detector =
            AnomalyDetector::default().with_scorer(Arc::new(StatisticalScorer::new()));
        let engine = FingerprintEngine::new(Duration::from_secs(10), Quantization::default());
        let mut lineage = Lineage::new(20);

        for g in 0..12i64 {
            let base = 1_000_000.0 + (g % 3) as f64 * 1000.0;
            let history = window(g * 10, base, 0.0);
            lineage.advance(engine.compute(&history).unwrap());
        }
        let shifted = window(120, 40_000_000.0, 0.0);
        lineage.advance(engine.compute(&shifted).unwrap());

        let records =
            detector.evaluate(&entity(), &shifted[9], &Baseline::new(), &shifted, &mut lineage);
        let drift: Vec<_> = records
            .iter()
            .filter(|r| r.kind == AnomalyKind::PatternDrift)
            .collect();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].severity, Severity::Medium);
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&AnomalyKind::MemoryLeak).unwrap();
        assert_eq!(json, "\"MEMORY_LEAK\"");
        assert_eq!(AnomalyKind::RatioDeviation.to_string(), "RATIO_DEVIATION");
        assert!(Severity::High > Severity::Medium && Severity::Medium > Severity::Low);
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
    }
}
