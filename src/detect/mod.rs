//! Anomaly Detection
//!
//! - **detector**: deviation, leak and drift paths producing `AnomalyRecord`s
//! - **scorer**: the optional `OutlierScorer` capability and a statistical scorer
//! - **isolation**: a seeded isolation forest scorer

pub mod detector;
pub mod isolation;
pub mod scorer;

pub use detector::{
    AnomalyDetector, AnomalyKind, AnomalyRecord, DetectorConfig, Evidence, LeakState,
    MetricField, Severity, HIGH_DEVIATION,
};
pub use isolation::IsolationForest;
pub use scorer::{
    contamination_cutoff, judge, OutlierScorer, OutlierScores, OutlierVerdict, StatisticalScorer,
};
