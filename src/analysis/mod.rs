//! Behavioral Analysis
//!
//! Read-only consumers of an entity's history:
//!
//! - **regression**: the shared least-squares growth fit and summary stats
//! - **fingerprint**: memory "DNA" signatures and per-entity generations
//! - **trend**: growth rate, time-to-threshold projection, short forecasts,
//!   usage patterns
//!
//! Both the fingerprint engine and the trend estimator derive growth from
//! `regression::growth_fit`, so their growth rates are always identical.

pub mod fingerprint;
pub mod regression;
pub mod trend;

pub use fingerprint::{
    complexity_score, BreakdownRatios, FeatureVector, Fingerprint, FingerprintEngine,
    FingerprintSummary, Lineage, Quantization, SignatureBuckets,
};
pub use regression::{autocorrelation, growth_fit, least_squares, r_squared, GrowthFit, LinearFit};
pub use trend::{
    Confidence, ForecastPoint, Projection, TrendEstimator, TrendPattern, DEFAULT_HORIZON_CAP,
};
