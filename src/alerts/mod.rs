//! Alert aggregation: debounce, retention and the query surface

pub mod aggregator;

pub use aggregator::{AlertAggregator, AlertStats, DEFAULT_RETENTION_CAP};
