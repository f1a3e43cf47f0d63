//! Core data types for memory history
//!
//! - `EntityId`: the system, or a process keyed by (pid, start time)
//! - `Entity`: an id plus a display name
//! - `Sample`: one immutable memory measurement

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Breakdown category: shared pages (bytes)
pub const BREAKDOWN_SHARED: &str = "shared";
/// Breakdown category: data segment (bytes)
pub const BREAKDOWN_DATA: &str = "data";
/// Breakdown category: stack segment (bytes)
pub const BREAKDOWN_STACK: &str = "stack";
/// Breakdown category: page cache (bytes, system only)
pub const BREAKDOWN_CACHED: &str = "cached";
/// Breakdown category: total physical memory (bytes, system only)
pub const BREAKDOWN_TOTAL: &str = "total";
/// Breakdown category: swap in use (bytes, system only)
pub const BREAKDOWN_SWAP_USED: &str = "swap_used";
/// Breakdown category: swap capacity (bytes, system only)
pub const BREAKDOWN_SWAP_TOTAL: &str = "swap_total";

/// Stable identity of a monitored entity
///
/// Processes are keyed by PID *and* start time so a recycled PID is a new
/// entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// System-wide memory
    System,
    /// A single process
    Process {
        pid: u32,
        /// Process start time as reported by the source (opaque, monotonic per boot)
        start_time: u64,
    },
}

impl EntityId {
    pub fn process(pid: u32, start_time: u64) -> Self {
        EntityId::Process { pid, start_time }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, EntityId::System)
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            EntityId::System => None,
            EntityId::Process { pid, .. } => Some(*pid),
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::System => write!(f, "system"),
            EntityId::Process { pid, start_time } => write!(f, "pid:{}@{}", pid, start_time),
        }
    }
}

/// An entity as listed by a sample source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Entity {
    pub id: EntityId,
    /// Human-readable name (process name, or "system")
    pub name: String,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn system() -> Self {
        Self::new(EntityId::System, "system")
    }
}

/// A single memory measurement
///
/// Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub entity_id: EntityId,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Resident set size
    pub resident_bytes: u64,
    /// Virtual memory size
    pub virtual_bytes: u64,
    /// Share of total physical memory, 0-100
    pub percent_of_total: f64,
    /// Optional per-category byte counts (see the `BREAKDOWN_*` keys)
    #[serde(default)]
    pub breakdown: Option<BTreeMap<String, u64>>,
}

impl Sample {
    /// Create a sample stamped with the current time
    pub fn new(entity_id: EntityId, resident_bytes: u64, percent_of_total: f64) -> Self {
        Self::with_timestamp(
            entity_id,
            Utc::now().timestamp_millis(),
            resident_bytes,
            percent_of_total,
        )
    }

    /// Create a sample with a specific timestamp
    pub fn with_timestamp(
        entity_id: EntityId,
        timestamp: i64,
        resident_bytes: u64,
        percent_of_total: f64,
    ) -> Self {
        Self {
            entity_id,
            timestamp,
            resident_bytes,
            virtual_bytes: resident_bytes,
            percent_of_total,
            breakdown: None,
        }
    }

    /// Builder: set virtual size
    pub fn virtual_bytes(mut self, bytes: u64) -> Self {
        self.virtual_bytes = bytes;
        self
    }

    /// Builder: add a breakdown category
    pub fn category(mut self, key: impl Into<String>, bytes: u64) -> Self {
        self.breakdown
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), bytes);
        self
    }

    /// Bytes recorded for a breakdown category
    pub fn category_bytes(&self, key: &str) -> Option<u64> {
        self.breakdown.as_ref().and_then(|b| b.get(key).copied())
    }

    /// Share of total memory as a fraction (0.0-1.0)
    pub fn fraction_of_total(&self) -> f64 {
        self.percent_of_total / 100.0
    }

    /// Resident over virtual size; `None` without a virtual size
    pub fn memory_ratio(&self) -> Option<f64> {
        (self.virtual_bytes > 0).then(|| self.resident_bytes as f64 / self.virtual_bytes as f64)
    }

    /// A breakdown category's share of resident bytes
    ///
    /// `None` when the sample has no breakdown or no resident memory. A
    /// category missing from a present breakdown counts as zero.
    pub fn breakdown_ratio(&self, key: &str) -> Option<f64> {
        let breakdown = self.breakdown.as_ref()?;
        if self.resident_bytes == 0 {
            return None;
        }
        let bytes = breakdown.get(key).copied().unwrap_or(0);
        Some(bytes as f64 / self.resident_bytes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display() {
        assert_eq!(EntityId::System.to_string(), "system");
        assert_eq!(EntityId::process(7, 99).to_string(), "pid:7@99");
    }

    #[test]
    fn test_reused_pid_is_distinct() {
        let first = EntityId::process(42, 100);
        let reused = EntityId::process(42, 200);
        assert_ne!(first, reused);
        assert_eq!(first.pid(), reused.pid());
    }

    #[test]
    fn test_sample_builder() {
        let sample = Sample::with_timestamp(EntityId::process(1, 1), 1000, 4096, 12.5)
            .virtual_bytes(8192)
            .category(BREAKDOWN_SHARED, 1024);

        assert_eq!(sample.virtual_bytes, 8192);
        assert_eq!(sample.category_bytes(BREAKDOWN_SHARED), Some(1024));
        assert_eq!(sample.category_bytes(BREAKDOWN_STACK), None);
        assert!((sample.fraction_of_total() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_ratios() {
        let sample = Sample::with_timestamp(EntityId::process(1, 1), 1000, 4096, 1.0)
            .virtual_bytes(16384)
            .category(BREAKDOWN_SHARED, 1024);

        assert_eq!(sample.memory_ratio(), Some(0.25));
        assert_eq!(sample.breakdown_ratio(BREAKDOWN_SHARED), Some(0.25));
        assert_eq!(sample.breakdown_ratio(BREAKDOWN_STACK), Some(0.0));

        let bare = Sample::with_timestamp(EntityId::System, 1000, 4096, 1.0).virtual_bytes(0);
        assert_eq!(bare.memory_ratio(), None);
        assert_eq!(bare.breakdown_ratio(BREAKDOWN_SHARED), None);
    }
}
