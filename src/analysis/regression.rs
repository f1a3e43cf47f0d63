//! Shared statistics
//!
//! The one least-squares implementation used by both the fingerprint engine
//! and the trend estimator, plus the summary helpers they share.

use crate::error::{MonitorError, MonitorResult};
use crate::history::Sample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum samples for any regression-based computation
pub const MIN_SAMPLES: usize = 2;

/// A fitted line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares fit of `y` against `x`
///
/// Returns `None` for mismatched or empty input. A degenerate `x` (all equal)
/// yields a flat line through the mean.
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }

    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();

    let denominator = n * sum_x2 - sum_x.powi(2);
    if denominator.abs() <= f64::EPSILON {
        return Some(LinearFit {
            slope: 0.0,
            intercept: sum_y / n,
        });
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some(LinearFit { slope, intercept })
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// stddev / mean, or 0 when the mean is 0
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() <= f64::EPSILON {
        return 0.0;
    }
    stddev(values) / m
}

/// Coefficient of determination of `fit` over the points
///
/// A series with no spread is explained perfectly by its flat line.
pub fn r_squared(x: &[f64], y: &[f64], fit: &LinearFit) -> f64 {
    let m = mean(y);
    let ss_tot: f64 = y.iter().map(|v| (v - m).powi(2)).sum();
    let ss_res: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (b - fit.at(*a)).powi(2))
        .sum();

    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

/// Mean-centred autocorrelation at `lag`, in [-1, 1]
///
/// 0 for a flat series or a lag that leaves no overlap.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag == 0 || lag >= values.len() {
        return 0.0;
    }
    let m = mean(values);
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    let numerator: f64 = values
        .iter()
        .zip(values[lag..].iter())
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    numerator / denominator
}

/// Regression of resident bytes against elapsed time over a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthFit {
    /// Fit with x in seconds since `origin`
    pub fit: LinearFit,
    /// Timestamp (ms) of the first sample in the window
    pub origin: i64,
    /// Mean resident bytes over the window
    pub mean_rss: f64,
    /// Fractional growth per sampling interval (slope * interval / mean)
    pub growth_rate: f64,
    /// Seconds between the first and last sample
    pub span_secs: f64,
    /// Fitted fractional change from the first to the last sample (slope * span / mean)
    pub window_growth: f64,
    pub r_squared: f64,
    pub sample_count: usize,
}

impl GrowthFit {
    /// Predicted resident bytes at a timestamp (ms)
    pub fn predict_at(&self, timestamp: i64) -> f64 {
        self.fit.at((timestamp - self.origin) as f64 / 1000.0)
    }
}

/// Fit resident bytes over a sample window
///
/// Fails with `InsufficientHistory` below two samples.
pub fn growth_fit(samples: &[Sample], interval: Duration) -> MonitorResult<GrowthFit> {
    if samples.len() < MIN_SAMPLES {
        return Err(MonitorError::InsufficientHistory {
            required: MIN_SAMPLES,
            available: samples.len(),
        });
    }

    let origin = samples[0].timestamp;
    let x: Vec<f64> = samples
        .iter()
        .map(|s| (s.timestamp - origin) as f64 / 1000.0)
        .collect();
    let y: Vec<f64> = samples.iter().map(|s| s.resident_bytes as f64).collect();

    let fit = least_squares(&x, &y).ok_or(MonitorError::InsufficientHistory {
        required: MIN_SAMPLES,
        available: samples.len(),
    })?;

    let mean_rss = mean(&y);
    let span_secs = x[x.len() - 1];
    let (growth_rate, window_growth) = if mean_rss > 0.0 {
        (
            fit.slope * interval.as_secs_f64() / mean_rss,
            fit.slope * span_secs / mean_rss,
        )
    } else {
        (0.0, 0.0)
    };

    Ok(GrowthFit {
        fit,
        origin,
        mean_rss,
        growth_rate,
        span_secs,
        window_growth,
        r_squared: r_squared(&x, &y, &fit),
        sample_count: samples.len(),
    })
}
