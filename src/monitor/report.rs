//! Tracking reports
//!
//! Pull-based views for a reporting collaborator: per-entity summaries, the
//! top entities by resident size, how process memory is distributed, and
//! optimization suggestions derived from the latest system and process
//! samples.

use crate::alerts::AlertStats;
use crate::analysis::regression;
use crate::analysis::{Fingerprint, Projection, TrendPattern};
use crate::detect::{AnomalyRecord, Severity};
use crate::history::{
    Entity, Sample, BREAKDOWN_CACHED, BREAKDOWN_SWAP_TOTAL, BREAKDOWN_SWAP_USED, BREAKDOWN_TOTAL,
};
use serde::{Deserialize, Serialize};

/// System memory use (percent) above which a HIGH suggestion is raised
pub const SYSTEM_PRESSURE_PERCENT: f64 = 80.0;
/// Swap use (fraction) above which a MEDIUM suggestion is raised
pub const SWAP_PRESSURE_FRACTION: f64 = 0.5;
/// Share of tracked process memory above which a process is called out
pub const PROCESS_SHARE_FRACTION: f64 = 0.2;
/// Page cache (fraction of total) below which a LOW suggestion is raised
pub const LOW_CACHE_FRACTION: f64 = 0.1;

/// Resident size above which a process counts as high-memory (100 MiB)
pub const HIGH_MEMORY_BYTES: u64 = 100 * 1024 * 1024;
/// Resident size above which a process counts as medium-memory (10 MiB)
pub const MEDIUM_MEMORY_BYTES: u64 = 10 * 1024 * 1024;

/// Statistics and derived state for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity: Entity,
    pub sample_count: usize,
    pub avg_rss: f64,
    pub max_rss: u64,
    pub min_rss: u64,
    pub std_rss: f64,
    pub latest: Sample,
    pub fingerprint: Option<Fingerprint>,
    pub projection: Option<Projection>,
    pub patterns: Vec<TrendPattern>,
    /// Most recent first
    pub recent_anomalies: Vec<AnomalyRecord>,
}

impl EntitySummary {
    /// Summary statistics over a history window; `None` when empty
    pub fn from_history(entity: Entity, history: &[Sample]) -> Option<Self> {
        let latest = history.last()?.clone();
        let rss: Vec<f64> = history.iter().map(|s| s.resident_bytes as f64).collect();

        Some(Self {
            entity,
            sample_count: history.len(),
            avg_rss: regression::mean(&rss),
            max_rss: history.iter().map(|s| s.resident_bytes).max().unwrap_or(0),
            min_rss: history.iter().map(|s| s.resident_bytes).min().unwrap_or(0),
            std_rss: regression::stddev(&rss),
            latest,
            fingerprint: None,
            projection: None,
            patterns: Vec::new(),
            recent_anomalies: Vec::new(),
        })
    }
}

/// What a suggestion is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    SystemMemory,
    Swap,
    ProcessShare,
    PageCache,
}

/// An optimization hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: SuggestionCategory,
    pub severity: Severity,
    pub message: String,
    /// The measured value that triggered the hint
    pub value: f64,
}

/// How tracked process memory splits across large and small processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDistribution {
    /// Sum of the latest resident size of every process
    pub total_process_memory: u64,
    pub high_memory_count: usize,
    pub medium_memory_count: usize,
    pub low_memory_count: usize,
    /// Share of processes that are high-memory, 0 with no processes
    pub memory_concentration: f64,
}

impl MemoryDistribution {
    pub fn from_samples<'a>(processes: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut dist = Self::default();
        for sample in processes {
            dist.total_process_memory =
                dist.total_process_memory.saturating_add(sample.resident_bytes);
            if sample.resident_bytes > HIGH_MEMORY_BYTES {
                dist.high_memory_count += 1;
            } else if sample.resident_bytes > MEDIUM_MEMORY_BYTES {
                dist.medium_memory_count += 1;
            } else {
                dist.low_memory_count += 1;
            }
        }

        let count = dist.high_memory_count + dist.medium_memory_count + dist.low_memory_count;
        if count > 0 {
            dist.memory_concentration = dist.high_memory_count as f64 / count as f64;
        }
        dist
    }
}

/// Snapshot report over all tracked entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingReport {
    /// Unix timestamp in milliseconds
    pub generated_at: i64,
    pub tracked_entities: usize,
    pub fingerprinted_entities: usize,
    pub system: Option<EntitySummary>,
    /// Largest processes by latest resident size
    pub top_processes: Vec<EntitySummary>,
    /// Over every tracked process, not only the top ones
    pub distribution: MemoryDistribution,
    pub alerts: AlertStats,
    pub suggestions: Vec<Suggestion>,
}

/// Optimization hints from the latest system sample and process samples
pub fn suggestions(system: Option<&Sample>, processes: &[(Entity, Sample)]) -> Vec<Suggestion> {
    let mut out = Vec::new();

    if let Some(system) = system {
        if system.percent_of_total > SYSTEM_PRESSURE_PERCENT {
            out.push(Suggestion {
                category: SuggestionCategory::SystemMemory,
                severity: Severity::High,
                message: format!(
                    "System memory at {:.1}%; consider freeing memory or adding capacity",
                    system.percent_of_total
                ),
                value: system.percent_of_total,
            });
        }

        if let (Some(used), Some(total)) = (
            system.category_bytes(BREAKDOWN_SWAP_USED),
            system.category_bytes(BREAKDOWN_SWAP_TOTAL),
        ) {
            let fraction = if total > 0 { used as f64 / total as f64 } else { 0.0 };
            if fraction > SWAP_PRESSURE_FRACTION {
                out.push(Suggestion {
                    category: SuggestionCategory::Swap,
                    severity: Severity::Medium,
                    message: format!(
                        "Swap {:.1}% used; the system is short of physical memory",
                        fraction * 100.0
                    ),
                    value: fraction,
                });
            }
        }

        if let (Some(cached), Some(total)) = (
            system.category_bytes(BREAKDOWN_CACHED),
            system.category_bytes(BREAKDOWN_TOTAL),
        ) {
            if total > 0 {
                let fraction = cached as f64 / total as f64;
                if fraction < LOW_CACHE_FRACTION {
                    out.push(Suggestion {
                        category: SuggestionCategory::PageCache,
                        severity: Severity::Low,
                        message: format!(
                            "Page cache only {:.1}% of memory; I/O may suffer",
                            fraction * 100.0
                        ),
                        value: fraction,
                    });
                }
            }
        }
    }

    // A single process trivially holds all process memory
    if processes.len() > 1 {
        let total: u64 = processes.iter().map(|(_, s)| s.resident_bytes).sum();
        if total > 0 {
            for (entity, sample) in processes {
                let share = sample.resident_bytes as f64 / total as f64;
                if share > PROCESS_SHARE_FRACTION {
                    out.push(Suggestion {
                        category: SuggestionCategory::ProcessShare,
                        severity: Severity::Medium,
                        message: format!(
                            "{} ({}) holds {:.1}% of tracked process memory",
                            entity.name,
                            entity.id,
                            share * 100.0
                        ),
                        value: share,
                    });
                }
            }
        }
    }

    out
}
