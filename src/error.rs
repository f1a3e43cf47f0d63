//! Engine error types
//!
//! Every failure in the engine degrades to "skip this computation this tick".
//! None of these variants is fatal to the monitoring loop.

use crate::history::EntityId;
use thiserror::Error;

/// Errors that can occur in the monitoring engine
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Sample timestamp is not after the last recorded one for the entity
    #[error("Out-of-order sample for {entity}: timestamp {timestamp} <= last recorded {last}")]
    OutOfOrderSample {
        entity: EntityId,
        timestamp: i64,
        last: i64,
    },

    /// Not enough samples yet (warm-up)
    #[error("Insufficient history: need {required} samples, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// The sample source no longer knows this entity
    #[error("Entity gone: {0}")]
    EntityGone(EntityId),

    /// Outlier model absent or undertrained
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Sample acquisition exceeded the per-tick timeout
    #[error("Sample source timed out for {entity} after {timeout_ms}ms")]
    SourceTimeout { entity: EntityId, timeout_ms: u64 },

    /// Sample source failed for another reason
    #[error("Sample source error: {0}")]
    Source(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Snapshot data failed validation (magic, version, checksum)
    #[error("Corrupt snapshot: {0}")]
    Corruption(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether this error only means "skip for now" during warm-up
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::InsufficientHistory { .. }
                | MonitorError::ModelUnavailable(_)
                | MonitorError::SourceTimeout { .. }
        )
    }
}

impl From<bincode::Error> for MonitorError {
    fn from(err: bincode::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}

/// Result type alias for engine operations
pub type MonitorResult<T> = Result<T, MonitorError>;
