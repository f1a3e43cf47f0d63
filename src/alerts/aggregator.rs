//! Alert Aggregator
//!
//! Single retention list of anomaly records shared by all entities.
//! `ingest` holds the write lock for the whole batch, so readers never see a
//! half-applied ingest. Newly accepted records are also published on a
//! broadcast channel for live consumers.

use crate::detect::{AnomalyKind, AnomalyRecord, Severity};
use crate::history::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Default number of records kept
pub const DEFAULT_RETENTION_CAP: usize = 200;

const FEED_CAPACITY: usize = 1024;

/// Aggregator counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    /// Records offered to `ingest`
    pub received: u64,
    /// Records kept as new entries
    pub accepted: u64,
    /// Records merged into an existing entry
    pub debounced: u64,
    /// Records dropped by the retention cap
    pub evicted: u64,
    pub retained: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Default)]
struct AlertState {
    /// Ingest order, oldest first
    records: VecDeque<AnomalyRecord>,
    received: u64,
    accepted: u64,
    debounced: u64,
    evicted: u64,
}

impl AlertState {
    /// Index of a record this one should merge with
    fn duplicate_of(&self, record: &AnomalyRecord, window_ms: i64) -> Option<usize> {
        self.records.iter().rposition(|existing| {
            existing.entity_id == record.entity_id
                && existing.kind == record.kind
                && (existing.detected_at - record.detected_at).abs() <= window_ms
        })
    }
}

/// Deduplicating, capped store of anomaly records
pub struct AlertAggregator {
    retention_cap: usize,
    debounce_window: Duration,
    state: RwLock<AlertState>,
    feed: broadcast::Sender<AnomalyRecord>,
}

impl AlertAggregator {
    pub fn new(retention_cap: usize, debounce_window: Duration) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            retention_cap: retention_cap.max(1),
            debounce_window,
            state: RwLock::new(AlertState::default()),
            feed,
        }
    }

    pub fn retention_cap(&self) -> usize {
        self.retention_cap
    }

    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    /// Add a batch of records
    ///
    /// A record for the same entity and kind as a retained one, detected
    /// within the debounce window, collapses into it: the higher severity
    /// wins, and on a tie the earlier record stands. Retention is enforced
    /// once at the end of the batch. Returns the records accepted as new or
    /// replacing entries.
    pub async fn ingest(&self, records: Vec<AnomalyRecord>) -> Vec<AnomalyRecord> {
        if records.is_empty() {
            return Vec::new();
        }

        let window_ms = self.debounce_window.as_millis() as i64;
        let mut accepted = Vec::new();
        let mut state = self.state.write().await;

        for record in records {
            state.received += 1;

            match state.duplicate_of(&record, window_ms) {
                Some(idx) if state.records[idx].severity >= record.severity => {
                    state.debounced += 1;
                    tracing::debug!(
                        entity = %record.entity_id,
                        kind = %record.kind,
                        "Debounced duplicate anomaly"
                    );
                }
                Some(idx) => {
                    state.debounced += 1;
                    state.records.remove(idx);
                    state.records.push_back(record.clone());
                    accepted.push(record);
                }
                None => {
                    state.accepted += 1;
                    state.records.push_back(record.clone());
                    accepted.push(record);
                }
            }
        }

        let mut dropped = 0;
        while state.records.len() > self.retention_cap {
            state.records.pop_front();
            dropped += 1;
        }
        state.evicted += dropped;
        drop(state);

        if dropped > 0 {
            tracing::debug!(dropped, "Alert retention cap reached");
        }

        for record in &accepted {
            tracing::info!(
                entity = %record.entity_id,
                name = %record.entity_name,
                kind = %record.kind,
                severity = %record.severity,
                detected_at = record.detected_at,
                "Anomaly detected"
            );
            // No receivers is fine
            let _ = self.feed.send(record.clone());
        }

        accepted
    }

    /// Records at or above `min_severity`, most recent first
    pub async fn query(
        &self,
        entity: Option<&EntityId>,
        min_severity: Severity,
    ) -> Vec<AnomalyRecord> {
        let state = self.state.read().await;
        let mut matches: Vec<AnomalyRecord> = state
            .records
            .iter()
            .rev()
            .filter(|r| entity.map_or(true, |id| &r.entity_id == id))
            .filter(|r| r.severity >= min_severity)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        matches
    }

    /// Most recent records of one kind
    pub async fn query_kind(&self, kind: AnomalyKind, limit: usize) -> Vec<AnomalyRecord> {
        let mut matches: Vec<AnomalyRecord> = self
            .query(None, Severity::Low)
            .await
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();
        matches.truncate(limit);
        matches
    }

    /// Live feed of newly accepted records
    pub fn subscribe(&self) -> broadcast::Receiver<AnomalyRecord> {
        self.feed.subscribe()
    }

    pub async fn stats(&self) -> AlertStats {
        let state = self.state.read().await;
        let count = |sev: Severity| state.records.iter().filter(|r| r.severity == sev).count();

        AlertStats {
            received: state.received,
            accepted: state.accepted,
            debounced: state.debounced,
            evicted: state.evicted,
            retained: state.records.len(),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }
}

impl Default for AlertAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_CAP, Duration::from_secs(10))
    }
}
