//! Isolation Forest scorer
//!
//! Random trees that isolate points by splitting on a random feature at a
//! random threshold. Outliers isolate in fewer splits, so a short average
//! path length means a high anomaly score:
//!
//! ```text
//! s(x) = 2 ^ ( -E[h(x)] / c(psi) )
//! ```
//!
//! Seeded, so a given training set always produces the same forest.

use crate::analysis::FeatureVector;
use crate::detect::scorer::{OutlierScorer, OutlierScores};
use crate::error::{MonitorError, MonitorResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Isolation forest settings
#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub trees: usize,
    /// Sub-sample size per tree (psi); capped at the training size
    pub sample_size: usize,
    pub seed: u64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            trees: 100,
            sample_size: 256,
            seed: 42,
        }
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    pub fn new(trees: usize, seed: u64) -> Self {
        Self {
            trees: trees.max(1),
            seed,
            ..Default::default()
        }
    }

    fn build(points: &[FeatureVector], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || points.len() <= 1 {
            return Node::Leaf { size: points.len() };
        }

        // Only features with spread can split
        let splittable: Vec<(usize, f64, f64)> = (0..FeatureVector::LEN)
            .filter_map(|f| {
                let (min, max) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, p| {
                    (acc.0.min(p.get(f)), acc.1.max(p.get(f)))
                });
                (max > min).then_some((f, min, max))
            })
            .collect();

        if splittable.is_empty() {
            return Node::Leaf { size: points.len() };
        }

        let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
        let threshold = rng.gen_range(min..max);

        let (left, right): (Vec<FeatureVector>, Vec<FeatureVector>) =
            points.iter().partition(|p| p.get(feature) < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Self::build(&left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build(&right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(node: &Node, point: &FeatureVector, depth: f64) -> f64 {
        match node {
            Node::Leaf { size } => depth + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point.get(*feature) < *threshold {
                    Self::path_length(left, point, depth + 1.0)
                } else {
                    Self::path_length(right, point, depth + 1.0)
                }
            }
        }
    }

    fn grow(&self, training: &[FeatureVector]) -> (Vec<Node>, usize) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let psi = self.sample_size.clamp(2, training.len());
        let max_depth = (psi as f64).log2().ceil() as usize;

        let forest = (0..self.trees)
            .map(|_| {
                let subset: Vec<FeatureVector> = rand::seq::index::sample(&mut rng, training.len(), psi)
                    .into_iter()
                    .map(|i| training[i])
                    .collect();
                Self::build(&subset, 0, max_depth, &mut rng)
            })
            .collect();

        (forest, psi)
    }
}

/// Average unsuccessful-search path length in a BST of `n` nodes, c(n)
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

impl OutlierScorer for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn score(
        &self,
        training: &[FeatureVector],
        candidate: &FeatureVector,
    ) -> MonitorResult<OutlierScores> {
        if training.len() < 2 {
            return Err(MonitorError::ModelUnavailable(format!(
                "isolation forest needs 2 training vectors, have {}",
                training.len()
            )));
        }

        let (forest, psi) = self.grow(training);
        let norm = average_path_length(psi);

        let score = |point: &FeatureVector| -> f64 {
            let mean_path = forest
                .iter()
                .map(|tree| Self::path_length(tree, point, 0.0))
                .sum::<f64>()
                / forest.len() as f64;
            2f64.powf(-mean_path / norm)
        };

        Ok(OutlierScores {
            candidate: score(candidate),
            training: training.iter().map(score).collect(),
        })
    }
}
