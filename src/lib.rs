//! # memdna
//!
//! Memory behavior fingerprinting and anomaly detection. Turns a stream of
//! periodic per-process and system memory samples into:
//!
//! - a compact per-process "DNA" signature,
//! - a growth estimate with time-to-threshold projection,
//! - classified anomaly verdicts (leaks, spikes, ratio deviations, drift).
//!
//! ## Modules
//!
//! - [`history`]: bounded per-entity sample rings and rolling baselines
//! - [`analysis`]: shared regression, fingerprint engine, trend estimator
//! - [`detect`]: anomaly detector and outlier scorers
//! - [`alerts`]: debounced, capped alert aggregation
//! - [`monitor`]: sampling loop, sample sources, reports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memdna::{Config, CsvReplaySource, Monitor, RunOptions, Severity};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let source = CsvReplaySource::from_path("samples.csv")?;
//!
//!     let monitor = Monitor::new(&config, Arc::new(source));
//!     monitor.run(RunOptions::default()).await;
//!
//!     for record in monitor.alerts().query(None, Severity::Medium).await {
//!         println!("{}", record);
//!     }
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod analysis;
pub mod config;
pub mod detect;
pub mod error;
pub mod history;
pub mod monitor;

// Re-export top-level types for convenience
pub use error::{MonitorError, MonitorResult};

pub use history::{
    Baseline, EngineSnapshot, Entity, EntityId, EntitySnapshot, HistoryStore, RunningStats, Sample,
};

pub use analysis::{
    Confidence, Fingerprint, FingerprintEngine, FingerprintSummary, ForecastPoint, Lineage,
    Projection, Quantization, TrendEstimator, TrendPattern,
};

pub use detect::{
    AnomalyDetector, AnomalyKind, AnomalyRecord, DetectorConfig, Evidence, IsolationForest,
    OutlierScorer, Severity, StatisticalScorer,
};

pub use alerts::{AlertAggregator, AlertStats};

pub use monitor::{
    CsvReplaySource, EntitySummary, MemoryDistribution, Monitor, RunOptions, SampleSource,
    Suggestion, TickSummary, TrackingReport,
};

pub use config::{Config, ConfigError, LoggingConfig, ScorerKind};
