//! Outlier scoring capability
//!
//! The pattern-drift path depends on an optional `OutlierScorer`. Scorers fit
//! on an entity's own past feature vectors and score the current one; the
//! detector turns scores into a verdict with the configured contamination
//! rate.

use crate::analysis::FeatureVector;
use crate::analysis::regression;
use crate::error::{MonitorError, MonitorResult};
use serde::{Deserialize, Serialize};

/// Scores from one fit: the candidate plus every training vector
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierScores {
    /// Higher means more anomalous
    pub candidate: f64,
    pub training: Vec<f64>,
}

/// Outcome of scoring a candidate against its training set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierVerdict {
    pub score: f64,
    /// Score above which a vector counts as an outlier
    pub cutoff: f64,
    pub is_outlier: bool,
}

/// An outlier model that can be fit and scored on demand
pub trait OutlierScorer: Send + Sync {
    /// Short identifier used in evidence and logs
    fn name(&self) -> &str;

    /// Fit on `training` and score `candidate` along with every training vector
    fn score(
        &self,
        training: &[FeatureVector],
        candidate: &FeatureVector,
    ) -> MonitorResult<OutlierScores>;
}

/// Score that separates the top `contamination` share of training scores
///
/// Nearest-rank quantile at `1 - contamination`.
pub fn contamination_cutoff(training_scores: &[f64], contamination: f64) -> Option<f64> {
    if training_scores.is_empty() {
        return None;
    }
    let mut sorted = training_scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let rank = ((1.0 - contamination.clamp(0.0, 1.0)) * n as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, n) - 1])
}

/// Fit, score and classify in one step
pub fn judge(
    scorer: &dyn OutlierScorer,
    training: &[FeatureVector],
    candidate: &FeatureVector,
    contamination: f64,
) -> MonitorResult<OutlierVerdict> {
    let scores = scorer.score(training, candidate)?;
    let cutoff = contamination_cutoff(&scores.training, contamination).ok_or_else(|| {
        MonitorError::ModelUnavailable(format!("{} produced no training scores", scorer.name()))
    })?;

    Ok(OutlierVerdict {
        score: scores.candidate,
        cutoff,
        is_outlier: scores.candidate > cutoff,
    })
}

/// Largest per-feature z-score against the training distribution
///
/// Deterministic fallback when no ensemble model is wanted.
#[derive(Debug, Clone, Default)]
pub struct StatisticalScorer;

impl StatisticalScorer {
    pub fn new() -> Self {
        Self
    }
}

impl OutlierScorer for StatisticalScorer {
    fn name(&self) -> &str {
        "statistical"
    }

    fn score(
        &self,
        training: &[FeatureVector],
        candidate: &FeatureVector,
    ) -> MonitorResult<OutlierScores> {
        if training.len() < 2 {
            return Err(MonitorError::ModelUnavailable(format!(
                "statistical scorer needs 2 training vectors, have {}",
                training.len()
            )));
        }

        let moments: Vec<(f64, f64)> = (0..FeatureVector::LEN)
            .map(|i| {
                let column: Vec<f64> = training.iter().map(|v| v.get(i)).collect();
                (regression::mean(&column), regression::stddev(&column))
            })
            .collect();

        let max_z = |v: &FeatureVector| -> f64 {
            moments
                .iter()
                .enumerate()
                .filter(|(_, (_, sd))| *sd > f64::EPSILON)
                .map(|(i, (mean, sd))| ((v.get(i) - mean) / sd).abs())
                .fold(0.0, f64::max)
        };

        Ok(OutlierScores {
            candidate: max_z(candidate),
            training: training.iter().map(max_z).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_training() -> Vec<FeatureVector> {
        (0..12)
            .map(|i| {
                let jitter = (i % 3) as f64;
                FeatureVector([1000.0 + jitter, 0.1 + jitter * 0.01, 0.0, 0.2])
            })
            .collect()
    }

    #[test]
    fn test_contamination_cutoff() {
        let scores: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        assert_eq!(contamination_cutoff(&scores, 0.1), Some(9.0));
        assert_eq!(contamination_cutoff(&scores, 0.5), Some(5.0));
        assert_eq!(contamination_cutoff(&scores, 0.0), Some(10.0));
        assert_eq!(contamination_cutoff(&[], 0.1), None);
    }

    #[test]
    fn test_statistical_flags_far_candidate() {
        let training = steady_training();
        let far = FeatureVector([5000.0, 0.9, 0.3, 0.9]);
        let verdict = judge(&StatisticalScorer::new(), &training, &far, 0.1).unwrap();
        assert!(verdict.is_outlier);
        assert!(verdict.score > verdict.cutoff);
    }

    #[test]
    fn test_statistical_accepts_typical_candidate() {
        let training = steady_training();
        let typical = FeatureVector([1001.0, 0.11, 0.0, 0.2]);
        let verdict = judge(&StatisticalScorer::new(), &training, &typical, 0.1).unwrap();
        assert!(!verdict.is_outlier);
    }

    #[test]
    fn test_statistical_needs_training() {
        let err = StatisticalScorer::new()
            .score(&[], &FeatureVector([0.0; 4]))
            .unwrap_err();
        assert!(matches!(err, MonitorError::ModelUnavailable(_)));
    }
}
