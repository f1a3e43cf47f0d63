//! Trend Estimator
//!
//! Growth rate and time-to-threshold projection. Uses the same regression
//! as the fingerprint engine (`regression::growth_fit`) so the two can never
//! disagree on growth.
//!
//! Also classifies the recent share-of-total series into usage patterns
//! (rising, falling, periodic) and grades how far projections can be trusted.

use crate::analysis::regression::{autocorrelation, growth_fit, least_squares};
use crate::detect::Severity;
use crate::error::MonitorResult;
use crate::history::Sample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default projection horizon cap (90 days)
pub const DEFAULT_HORIZON_CAP: Duration = Duration::from_secs(90 * 24 * 3600);

/// Samples examined for a rising or falling trend
const TREND_WINDOW: usize = 10;
const MIN_TREND_SAMPLES: usize = 5;
/// Share-of-total slope (percentage points per interval) that counts as a trend
const TREND_SLOPE: f64 = 1.0;
/// Slope above which a rising trend is HIGH and projections are unreliable
const STEEP_SLOPE: f64 = 5.0;

/// Samples examined for periodicity
const PERIODIC_WINDOW: usize = 20;
/// Autocorrelation a lag must reach to count as a period
const MIN_PERIODIC_STRENGTH: f64 = 0.3;

/// Fit quality below which projections are low confidence
const MIN_FIT_R_SQUARED: f64 = 0.5;
/// Fit quality at or above which projections are high confidence
const STRONG_FIT_R_SQUARED: f64 = 0.9;

/// How far a projection or forecast can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Grade a fit by its quality and how steeply the share of total moves
    pub fn grade(r_squared: f64, share_slope: f64) -> Self {
        if share_slope.abs() > STEEP_SLOPE || r_squared < MIN_FIT_R_SQUARED {
            Confidence::Low
        } else if r_squared >= STRONG_FIT_R_SQUARED {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }
}

/// Where an entity's memory is heading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Fractional growth per sampling interval
    pub growth_rate: f64,
    /// Fitted fractional change across the whole window
    pub window_growth: f64,
    /// Share-of-total slope in percentage points per interval
    pub share_slope: f64,
    /// Fit quality of the resident-bytes regression
    pub r_squared: f64,
    pub confidence: Confidence,
    /// Latest share of total memory (0.0-1.0)
    pub current_fraction: f64,
    pub threshold_fraction: f64,
    /// Sampling intervals until the threshold is reached
    pub intervals_to_threshold: Option<f64>,
    /// Wall time until the threshold is reached; `None` when flat, shrinking or beyond the horizon cap
    pub estimated_time_to_threshold: Option<Duration>,
}

/// A predicted future sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub resident_bytes: f64,
    /// Predicted share of total memory, 0-100
    pub percent_of_total: f64,
    pub confidence: Confidence,
}

/// Shape of the recent share-of-total series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendPattern {
    IncreasingMemoryUsage { slope: f64, severity: Severity },
    DecreasingMemoryUsage { slope: f64 },
    PeriodicPattern { period: usize, strength: f64 },
}

/// Projects memory growth from history windows
#[derive(Debug, Clone)]
pub struct TrendEstimator {
    sampling_interval: Duration,
    horizon_cap: Duration,
}

impl TrendEstimator {
    pub fn new(sampling_interval: Duration, horizon_cap: Duration) -> Self {
        Self {
            sampling_interval,
            horizon_cap,
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    /// Fractional growth per sampling interval
    pub fn growth_rate(&self, history: &[Sample]) -> MonitorResult<f64> {
        Ok(growth_fit(history, self.sampling_interval)?.growth_rate)
    }

    /// Fitted fractional growth from the first to the last sample of the window
    pub fn window_growth(&self, history: &[Sample]) -> MonitorResult<f64> {
        Ok(growth_fit(history, self.sampling_interval)?.window_growth)
    }

    /// Elapsed sampling intervals since the first sample, per sample
    fn elapsed_intervals(&self, history: &[Sample]) -> Vec<f64> {
        let origin = history.first().map(|s| s.timestamp).unwrap_or(0);
        let interval_ms = self.sampling_interval.as_millis().max(1) as f64;
        history
            .iter()
            .map(|s| (s.timestamp - origin) as f64 / interval_ms)
            .collect()
    }

    /// Slope of `percent_of_total` in percentage points per sampling interval
    pub fn share_slope(&self, history: &[Sample]) -> f64 {
        let x = self.elapsed_intervals(history);
        let y: Vec<f64> = history.iter().map(|s| s.percent_of_total).collect();
        least_squares(&x, &y).map(|fit| fit.slope).unwrap_or(0.0)
    }

    /// Project when the latest share of total memory reaches `threshold_fraction`
    pub fn project(&self, history: &[Sample], threshold_fraction: f64) -> MonitorResult<Projection> {
        let fit = growth_fit(history, self.sampling_interval)?;
        let current_fraction = history[history.len() - 1].fraction_of_total();
        let share_slope = self.share_slope(history);

        let mut projection = Projection {
            growth_rate: fit.growth_rate,
            window_growth: fit.window_growth,
            share_slope,
            r_squared: fit.r_squared,
            confidence: Confidence::grade(fit.r_squared, share_slope),
            current_fraction,
            threshold_fraction,
            intervals_to_threshold: None,
            estimated_time_to_threshold: None,
        };

        if fit.growth_rate.is_nan() || fit.growth_rate <= 0.0 {
            return Ok(projection);
        }

        let intervals = ((threshold_fraction - current_fraction) / fit.growth_rate).max(0.0);
        let secs = intervals * self.sampling_interval.as_secs_f64();
        if !secs.is_finite() || secs > self.horizon_cap.as_secs_f64() {
            return Ok(projection);
        }

        projection.intervals_to_threshold = Some(intervals);
        projection.estimated_time_to_threshold = Some(Duration::from_secs_f64(secs));
        Ok(projection)
    }

    /// Predict the next `steps` sampling intervals
    pub fn forecast(&self, history: &[Sample], steps: usize) -> MonitorResult<Vec<ForecastPoint>> {
        let fit = growth_fit(history, self.sampling_interval)?;
        let x = self.elapsed_intervals(history);
        let y: Vec<f64> = history.iter().map(|s| s.percent_of_total).collect();
        let share = least_squares(&x, &y);
        let confidence = Confidence::grade(fit.r_squared, share.map(|f| f.slope).unwrap_or(0.0));

        let last = history[history.len() - 1].timestamp;
        let last_x = x[x.len() - 1];
        let step_ms = self.sampling_interval.as_millis() as i64;

        Ok((1..=steps as i64)
            .map(|i| {
                let timestamp = last + i * step_ms;
                let percent = share
                    .map(|f| f.at(last_x + i as f64))
                    .unwrap_or(y[y.len() - 1]);
                ForecastPoint {
                    timestamp,
                    resident_bytes: fit.predict_at(timestamp).max(0.0),
                    percent_of_total: percent.clamp(0.0, 100.0),
                    confidence,
                }
            })
            .collect())
    }

    /// Rising, falling and periodic patterns in the recent share of total
    pub fn patterns(&self, history: &[Sample]) -> Vec<TrendPattern> {
        let mut patterns = Vec::new();
        if history.len() < MIN_TREND_SAMPLES {
            return patterns;
        }

        let recent = &history[history.len().saturating_sub(TREND_WINDOW)..];
        let slope = self.share_slope(recent);
        if slope > TREND_SLOPE {
            let severity = if slope > STEEP_SLOPE {
                Severity::High
            } else {
                Severity::Medium
            };
            patterns.push(TrendPattern::IncreasingMemoryUsage { slope, severity });
        } else if slope < -TREND_SLOPE {
            patterns.push(TrendPattern::DecreasingMemoryUsage { slope });
        }

        if history.len() >= PERIODIC_WINDOW {
            let values: Vec<f64> = history[history.len() - PERIODIC_WINDOW..]
                .iter()
                .map(|s| s.percent_of_total)
                .collect();
            if let Some((period, strength)) = first_period(&values) {
                patterns.push(TrendPattern::PeriodicPattern { period, strength });
            }
        }

        patterns
    }
}

/// First lag whose autocorrelation is a local peak of useful strength
fn first_period(values: &[f64]) -> Option<(usize, f64)> {
    let r: Vec<f64> = (0..=values.len() / 2 + 1)
        .map(|lag| autocorrelation(values, lag))
        .collect();

    (2..r.len() - 1)
        .find(|&lag| r[lag] > r[lag - 1] && r[lag] >= r[lag + 1] && r[lag] >= MIN_PERIODIC_STRENGTH)
        .map(|lag| (lag, r[lag]))
}

impl Default for TrendEstimator {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), DEFAULT_HORIZON_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fingerprint::{FingerprintEngine, Quantization};
    use crate::history::EntityId;

    fn series(points: &[(u64, f64)]) -> Vec<Sample> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(rss, pct))| {
                Sample::with_timestamp(EntityId::process(3, 3), i as i64 * 10_000, rss, pct)
            })
            .collect()
    }

    #[test]
    fn test_flat_series_has_no_forecast() {
        let estimator = TrendEstimator::default();
        let history = series(&[(1000, 10.0); 8]);
        let projection = estimator.project(&history, 0.9).unwrap();

        assert_eq!(projection.growth_rate, 0.0);
        assert!(projection.estimated_time_to_threshold.is_none());
        assert!(projection.intervals_to_threshold.is_none());
    }

    #[test]
    fn test_shrinking_series_has_no_forecast() {
        let estimator = TrendEstimator::default();
        let history = series(&[(1000, 10.0), (900, 9.0), (800, 8.0)]);
        let projection = estimator.project(&history, 0.9).unwrap();

        assert!(projection.growth_rate < 0.0);
        assert!(projection.estimated_time_to_threshold.is_none());
    }

    #[test]
    fn test_growing_series_projects() {
        let estimator = TrendEstimator::default();
        // +10% of the mean per interval, currently at 50% of memory
        let history = series(&[(90, 40.0), (100, 45.0), (110, 50.0)]);
        let projection = estimator.project(&history, 0.9).unwrap();

        assert!((projection.growth_rate - 0.1).abs() < 1e-9);
        let intervals = projection.intervals_to_threshold.unwrap();
        assert!((intervals - 4.0).abs() < 1e-6);
        let eta = projection.estimated_time_to_threshold.unwrap();
        assert!((eta.as_secs_f64() - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_already_over_threshold() {
        let estimator = TrendEstimator::default();
        let history = series(&[(90, 92.0), (100, 95.0)]);
        let projection = estimator.project(&history, 0.9).unwrap();
        assert_eq!(projection.estimated_time_to_threshold, Some(Duration::ZERO));
    }

    #[test]
    fn test_horizon_cap() {
        let estimator = TrendEstimator::new(Duration::from_secs(10), Duration::from_secs(60));
        // Tiny growth: far beyond a one-minute horizon
        let history = series(&[(1_000_000, 1.0), (1_000_001, 1.0), (1_000_002, 1.0)]);
        let projection = estimator.project(&history, 0.9).unwrap();

        assert!(projection.growth_rate > 0.0);
        assert!(projection.estimated_time_to_threshold.is_none());
    }

    #[test]
    fn test_agrees_with_fingerprint_growth() {
        let interval = Duration::from_secs(10);
        let estimator = TrendEstimator::new(interval, DEFAULT_HORIZON_CAP);
        let engine = FingerprintEngine::new(interval, Quantization::default());

        let histories = [
            series(&[(100, 1.0), (130, 1.0), (125, 1.0), (170, 1.0)]),
            series(&[(500, 1.0), (450, 1.0), (470, 1.0), (300, 1.0)]),
            series(&[(42, 1.0), (42, 1.0)]),
        ];

        for history in &histories {
            let from_trend = estimator.growth_rate(history).unwrap();
            let from_fingerprint = engine.compute(history).unwrap().summary.growth_rate;
            assert_eq!(from_trend, from_fingerprint);
        }
    }

    #[test]
    fn test_forecast_clamps_at_zero() {
        let estimator = TrendEstimator::default();
        let history = series(&[(300, 1.0), (200, 1.0), (100, 1.0)]);
        let points = estimator.forecast(&history, 3).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp, 30_000);
        assert!(points[0].resident_bytes.abs() < 1e-6);
        assert_eq!(points[2].resident_bytes, 0.0);
    }

    #[test]
    fn test_window_growth_scales_with_span() {
        let estimator = TrendEstimator::default();
        let history = series(&[(100, 1.0), (110, 1.0), (120, 1.0), (130, 1.0)]);
        let per_interval = estimator.growth_rate(&history).unwrap();
        let window = estimator.window_growth(&history).unwrap();
        assert!((window - 3.0 * per_interval).abs() < 1e-12);

        let projection = estimator.project(&history, 0.9).unwrap();
        assert_eq!(projection.window_growth, window);
        assert_eq!(projection.growth_rate, per_interval);
    }

    #[test]
    fn test_confidence_grades() {
        assert_eq!(Confidence::grade(0.95, 0.5), Confidence::High);
        assert_eq!(Confidence::grade(0.7, 0.5), Confidence::Medium);
        assert_eq!(Confidence::grade(0.3, 0.5), Confidence::Low);
        // A share moving more than 5 points per interval is never trusted
        assert_eq!(Confidence::grade(1.0, 6.0), Confidence::Low);

        let estimator = TrendEstimator::default();
        let steady = estimator.project(&series(&[(90, 40.0), (100, 45.0), (110, 50.0)]), 0.9).unwrap();
        assert!((steady.share_slope - 5.0).abs() < 1e-9);
        assert_eq!(steady.confidence, Confidence::High);

        let noisy = series(&[(100, 1.0), (400, 1.0), (50, 1.0), (500, 1.0), (80, 1.0)]);
        assert_eq!(estimator.project(&noisy, 0.9).unwrap().confidence, Confidence::Low);
    }

    #[test]
    fn test_forecast_percent_clamped() {
        let estimator = TrendEstimator::default();
        let history = series(&[(100, 80.0), (110, 90.0), (120, 98.0)]);
        let points = estimator.forecast(&history, 2).unwrap();
        assert_eq!(points[1].percent_of_total, 100.0);
        assert!(points[0].resident_bytes > 120.0);
    }

    #[test]
    fn test_increasing_and_decreasing_patterns() {
        let estimator = TrendEstimator::default();

        let rising: Vec<(u64, f64)> = (0..10).map(|i| (1000, 20.0 + 2.0 * i as f64)).collect();
        match estimator.patterns(&series(&rising))[..] {
            [TrendPattern::IncreasingMemoryUsage { slope, severity }] => {
                assert!((slope - 2.0).abs() < 1e-9);
                assert_eq!(severity, Severity::Medium);
            }
            ref other => panic!("unexpected patterns {:?}", other),
        }

        let surging: Vec<(u64, f64)> = (0..10).map(|i| (1000, 6.0 * i as f64)).collect();
        match estimator.patterns(&series(&surging))[..] {
            [TrendPattern::IncreasingMemoryUsage { severity, .. }] => {
                assert_eq!(severity, Severity::High)
            }
            ref other => panic!("unexpected patterns {:?}", other),
        }

        let falling: Vec<(u64, f64)> = (0..6).map(|i| (1000, 60.0 - 3.0 * i as f64)).collect();
        assert!(matches!(
            estimator.patterns(&series(&falling))[..],
            [TrendPattern::DecreasingMemoryUsage { .. }]
        ));

        // Too short to judge
        assert!(estimator.patterns(&series(&rising[..4])).is_empty());
    }

    #[test]
    fn test_periodic_pattern() {
        let estimator = TrendEstimator::default();
        let wave: Vec<(u64, f64)> = (0..24)
            .map(|i| (1000, if i % 4 < 2 { 10.0 } else { 20.0 }))
            .collect();

        let patterns = estimator.patterns(&series(&wave));
        assert_eq!(patterns.len(), 1);
        match patterns[0] {
            TrendPattern::PeriodicPattern { period, strength } => {
                assert_eq!(period, 4);
                assert!(strength >= 0.8 - 1e-9);
            }
            other => panic!("unexpected pattern {:?}", other),
        }

        // A steady ramp has no period
        let ramp: Vec<(u64, f64)> = (0..24).map(|i| (1000, 10.0 + 0.1 * i as f64)).collect();
        assert!(estimator
            .patterns(&series(&ramp))
            .iter()
            .all(|p| !matches!(p, TrendPattern::PeriodicPattern { .. })));
    }
}
