//! Monitor
//!
//! The periodic sampling loop. Each tick:
//!
//! 1. list entities from the source (bounded by the sample timeout)
//! 2. per entity, with at most `max_workers` in flight: sample, record,
//!    advance the fingerprint lineage when due, evaluate
//! 3. ingest the tick's anomalies in one batch
//! 4. tear down entities whose grace period has run out
//!
//! Departures are counted in ticks, so replayed and live runs behave alike.
//! `stop()` is cooperative: the loop exits only between ticks.

use crate::alerts::AlertAggregator;
use crate::analysis::{
    FingerprintEngine, Fingerprint, ForecastPoint, Lineage, Projection, TrendEstimator,
};
use crate::config::{Config, ScorerKind};
use crate::detect::{AnomalyDetector, AnomalyRecord, IsolationForest, Severity, StatisticalScorer};
use crate::error::{MonitorError, MonitorResult};
use crate::history::{EngineSnapshot, Entity, EntityId, EntitySnapshot, HistoryStore};
use crate::monitor::report::{suggestions, EntitySummary, MemoryDistribution, TrackingReport};
use crate::monitor::source::SampleSource;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};

/// Past-generation feature vectors kept per entity
const FEATURE_HISTORY: usize = 50;

/// Anomalies attached to an entity summary
const SUMMARY_ANOMALIES: usize = 10;

/// Loop timing and sizing
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub sampling_interval: Duration,
    pub sample_timeout: Duration,
    pub max_workers: usize,
    pub grace_period: Duration,
    pub update_frequency: usize,
    pub threshold_fraction: f64,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sampling_interval: config.sampling_interval(),
            sample_timeout: Duration::from_millis(config.sampling.sample_timeout_ms),
            max_workers: config.sampling.max_workers.max(1),
            grace_period: Duration::from_secs(config.sampling.grace_period_secs),
            update_frequency: config.fingerprint.update_frequency.max(1),
            threshold_fraction: config.projection.threshold_fraction,
        }
    }

    /// Grace period in whole ticks, rounded up
    pub fn grace_ticks(&self) -> u64 {
        let interval = self.sampling_interval.as_millis().max(1);
        self.grace_period.as_millis().div_ceil(interval) as u64
    }
}

/// How `run` paces and ends
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after this many ticks
    pub max_ticks: Option<u64>,
    /// Wait one sampling interval between ticks; replays usually run unpaced
    pub paced: bool,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: u64,
    pub listed: usize,
    pub recorded: usize,
    pub timed_out: usize,
    pub rejected: usize,
    pub failed: usize,
    pub departed: usize,
    pub torn_down: usize,
    pub anomalies: usize,
}

enum EntityOutcome {
    Recorded(Vec<AnomalyRecord>),
    Gone(EntityId),
    TimedOut,
    Rejected,
    Failed,
}

/// Sampling loop and owner of all per-entity engine state
pub struct Monitor {
    settings: MonitorSettings,
    source: Arc<dyn SampleSource>,
    store: HistoryStore,
    engine: FingerprintEngine,
    trend: TrendEstimator,
    detector: AnomalyDetector,
    alerts: AlertAggregator,
    lineages: RwLock<HashMap<EntityId, Arc<Mutex<Lineage>>>>,
    /// Departed entity -> tick it was first missed
    departed: RwLock<HashMap<EntityId, u64>>,
    feature_capacity: usize,
    ticks: AtomicU64,
    /// Cleared by `stop`; the loop only ever sets it before it starts
    running: AtomicBool,
    wake: Notify,
}

impl Monitor {
    /// Build a monitor and all its components from configuration
    pub fn new(config: &Config, source: Arc<dyn SampleSource>) -> Self {
        let interval = config.sampling_interval();
        let trend = TrendEstimator::new(interval, config.horizon_cap());

        let mut detector = AnomalyDetector::new(config.detector_config(), trend.clone());
        match config.detection.scorer {
            ScorerKind::IsolationForest => {
                detector = detector.with_scorer(Arc::new(IsolationForest::new(
                    config.detection.forest_trees,
                    config.detection.seed,
                )));
            }
            ScorerKind::Statistical => {
                detector = detector.with_scorer(Arc::new(StatisticalScorer::new()));
            }
            ScorerKind::None => {}
        }

        Self {
            settings: MonitorSettings::from_config(config),
            source,
            store: HistoryStore::new(config.history.capacity),
            engine: FingerprintEngine::new(interval, config.quantization()),
            trend,
            detector,
            alerts: AlertAggregator::new(config.alerts.retention_cap, config.debounce_window()),
            lineages: RwLock::new(HashMap::new()),
            departed: RwLock::new(HashMap::new()),
            feature_capacity: FEATURE_HISTORY.max(config.detection.min_fingerprints),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn alerts(&self) -> &AlertAggregator {
        &self.alerts
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    async fn lineage(&self, id: &EntityId) -> Arc<Mutex<Lineage>> {
        if let Some(existing) = self.lineages.read().await.get(id) {
            return Arc::clone(existing);
        }
        let mut lineages = self.lineages.write().await;
        Arc::clone(
            lineages
                .entry(*id)
                .or_insert_with(|| Arc::new(Mutex::new(Lineage::new(self.feature_capacity)))),
        )
    }

    /// Run one sampling tick
    pub async fn tick(&self) -> TickSummary {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let mut summary = TickSummary {
            tick,
            ..Default::default()
        };

        let listed = match tokio::time::timeout(
            self.settings.sample_timeout,
            self.source.list_entities(),
        )
        .await
        {
            Ok(Ok(entities)) => entities,
            Ok(Err(e)) => {
                tracing::warn!(source = self.source.name(), error = %e, "Listing entities failed");
                return summary;
            }
            Err(_) => {
                tracing::debug!(source = self.source.name(), "Listing entities timed out");
                return summary;
            }
        };

        // A finished replay says nothing about departures
        if listed.is_empty() && self.source.is_exhausted() {
            return summary;
        }
        summary.listed = listed.len();

        let listed_ids: HashSet<EntityId> = listed.iter().map(|e| e.id).collect();
        let outcomes: Vec<(EntityId, EntityOutcome)> = stream::iter(listed)
            .map(|entity| async move {
                let id = entity.id;
                (id, self.process_entity(entity).await)
            })
            .buffer_unordered(self.settings.max_workers)
            .collect()
            .await;

        let mut batch = Vec::new();
        let mut gone = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                EntityOutcome::Recorded(records) => {
                    summary.recorded += 1;
                    self.departed.write().await.remove(&id);
                    batch.extend(records);
                }
                EntityOutcome::Gone(id) => gone.push(id),
                EntityOutcome::TimedOut => summary.timed_out += 1,
                EntityOutcome::Rejected => summary.rejected += 1,
                EntityOutcome::Failed => summary.failed += 1,
            }
        }

        // Tracked entities the source no longer lists have departed too
        for entity in self.store.entities().await {
            if !listed_ids.contains(&entity.id) {
                gone.push(entity.id);
            }
        }

        {
            let mut departed = self.departed.write().await;
            for id in gone {
                if self.store.contains(&id).await && !departed.contains_key(&id) {
                    tracing::debug!(entity = %id, tick, "Entity departed");
                    departed.insert(id, tick);
                    summary.departed += 1;
                }
            }
        }

        summary.anomalies = batch.len();
        if !batch.is_empty() {
            self.alerts.ingest(batch).await;
        }

        summary.torn_down = self.teardown(tick).await;

        tracing::debug!(
            tick,
            listed = summary.listed,
            recorded = summary.recorded,
            timed_out = summary.timed_out,
            anomalies = summary.anomalies,
            "Tick complete"
        );
        summary
    }

    async fn process_entity(&self, entity: Entity) -> EntityOutcome {
        let sample = match tokio::time::timeout(
            self.settings.sample_timeout,
            self.source.sample(&entity.id),
        )
        .await
        {
            Ok(Ok(sample)) => sample,
            Ok(Err(MonitorError::EntityGone(id))) => return EntityOutcome::Gone(id),
            Ok(Err(e)) => {
                tracing::warn!(entity = %entity.id, error = %e, "Sampling failed");
                return EntityOutcome::Failed;
            }
            Err(_) => {
                let e = MonitorError::SourceTimeout {
                    entity: entity.id,
                    timeout_ms: self.settings.sample_timeout.as_millis() as u64,
                };
                tracing::debug!(error = %e, "Skipping entity this tick");
                return EntityOutcome::TimedOut;
            }
        };

        let receipt = match self.store.record(&entity, sample.clone()).await {
            Ok(receipt) => receipt,
            Err(e @ MonitorError::OutOfOrderSample { .. }) => {
                tracing::warn!(error = %e, "Dropping sample");
                return EntityOutcome::Rejected;
            }
            Err(e) => {
                tracing::warn!(entity = %entity.id, error = %e, "Recording failed");
                return EntityOutcome::Failed;
            }
        };
        if receipt.created {
            tracing::debug!(entity = %entity.id, name = %entity.name, "Tracking new entity");
        }

        let lineage = self.lineage(&entity.id).await;
        let mut lineage = lineage.lock().await;

        let history = self.store.history(&entity.id).await;

        if lineage.note_sample(self.settings.update_frequency) {
            match self.engine.compute(&history) {
                Ok(fingerprint) => {
                    let fp = lineage.advance(fingerprint);
                    tracing::debug!(
                        entity = %entity.id,
                        generation = fp.generation,
                        signature = %fp.signature_hex(),
                        growth_rate = fp.summary.growth_rate,
                        "Fingerprint updated"
                    );
                }
                Err(e) => tracing::debug!(entity = %entity.id, error = %e, "Fingerprint skipped"),
            }
        }

        let records = self.detector.evaluate(
            &entity,
            &sample,
            &receipt.prior_baseline,
            &history,
            &mut lineage,
        );
        EntityOutcome::Recorded(records)
    }

    /// Remove entities whose grace period has elapsed
    async fn teardown(&self, tick: u64) -> usize {
        let grace = self.settings.grace_ticks();
        let expired: Vec<EntityId> = {
            let mut departed = self.departed.write().await;
            let expired: Vec<EntityId> = departed
                .iter()
                .filter(|(_, since)| tick.saturating_sub(**since) >= grace)
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                departed.remove(id);
            }
            expired
        };

        for id in &expired {
            let name = self.store.name(id).await.unwrap_or_default();
            self.store.remove(id).await;
            self.lineages.write().await.remove(id);
            tracing::info!(entity = %id, name = %name, "Entity gone; state released");
        }
        expired.len()
    }

    /// Tick until stopped, out of ticks, or the source is exhausted
    ///
    /// Returns the number of ticks run.
    pub async fn run(&self, options: RunOptions) -> u64 {
        self.running.store(true, Ordering::SeqCst);
        self.run_loop(options).await
    }

    /// Start the loop on a background task
    ///
    /// The monitor counts as running from the moment this returns, so a
    /// `stop` issued before the task is first polled still halts it.
    pub fn start(self: Arc<Self>, options: RunOptions) -> tokio::task::JoinHandle<u64> {
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(async move { self.run_loop(options).await })
    }

    async fn run_loop(&self, options: RunOptions) -> u64 {
        tracing::info!(
            source = self.source.name(),
            interval_secs = self.settings.sampling_interval.as_secs_f64(),
            paced = options.paced,
            "Monitor started"
        );

        let mut interval = tokio::time::interval(self.settings.sampling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ran = 0u64;

        loop {
            if options.paced {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = self.wake.notified() => {}
                }
            } else {
                tokio::task::yield_now().await;
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.tick().await;
            ran += 1;

            if options.max_ticks.is_some_and(|max| ran >= max) || self.source.is_exhausted() {
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!(ticks = ran, "Monitor stopped");
        ran
    }

    /// Ask the loop to halt after the current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest fingerprint of an entity
    pub async fn fingerprint(&self, id: &EntityId) -> Option<Fingerprint> {
        let lineage = self.lineages.read().await.get(id).cloned()?;
        let lineage = lineage.lock().await;
        lineage.current().cloned()
    }

    pub async fn previous_fingerprint(&self, id: &EntityId) -> Option<Fingerprint> {
        let lineage = self.lineages.read().await.get(id).cloned()?;
        let lineage = lineage.lock().await;
        lineage.previous().cloned()
    }

    /// Projection toward the configured threshold fraction
    pub async fn projection(&self, id: &EntityId) -> MonitorResult<Projection> {
        let history = self.store.history(id).await;
        self.trend.project(&history, self.settings.threshold_fraction)
    }

    pub async fn forecast(&self, id: &EntityId, steps: usize) -> MonitorResult<Vec<ForecastPoint>> {
        let history = self.store.history(id).await;
        self.trend.forecast(&history, steps)
    }

    /// Summary of one tracked entity
    pub async fn summary(&self, id: &EntityId) -> Option<EntitySummary> {
        let name = self.store.name(id).await?;
        let history = self.store.history(id).await;
        let mut summary = EntitySummary::from_history(Entity::new(*id, name), &history)?;

        summary.fingerprint = self.fingerprint(id).await;
        summary.projection = self
            .trend
            .project(&history, self.settings.threshold_fraction)
            .ok();
        summary.patterns = self.trend.patterns(&history);
        summary.recent_anomalies = self.alerts.query(Some(id), Severity::Low).await;
        summary.recent_anomalies.truncate(SUMMARY_ANOMALIES);
        Some(summary)
    }

    /// Report over all tracked entities, listing the `top_n` largest processes
    pub async fn report(&self, top_n: usize) -> TrackingReport {
        let entities = self.store.entities().await;

        let mut system = None;
        let mut processes = Vec::new();
        let mut fingerprinted = 0;
        for entity in &entities {
            let Some(summary) = self.summary(&entity.id).await else {
                continue;
            };
            if summary.fingerprint.is_some() {
                fingerprinted += 1;
            }
            if entity.id.is_system() {
                system = Some(summary);
            } else {
                processes.push(summary);
            }
        }

        processes.sort_by(|a, b| b.latest.resident_bytes.cmp(&a.latest.resident_bytes));
        let latest: Vec<(Entity, _)> = processes
            .iter()
            .map(|s| (s.entity.clone(), s.latest.clone()))
            .collect();
        let hints = suggestions(system.as_ref().map(|s| &s.latest), &latest);
        let distribution = MemoryDistribution::from_samples(latest.iter().map(|(_, s)| s));
        processes.truncate(top_n);

        TrackingReport {
            generated_at: Utc::now().timestamp_millis(),
            tracked_entities: entities.len(),
            fingerprinted_entities: fingerprinted,
            system,
            top_processes: processes,
            distribution,
            alerts: self.alerts.stats().await,
            suggestions: hints,
        }
    }

    /// Capture history and fingerprints of every tracked entity
    pub async fn snapshot(&self) -> EngineSnapshot {
        let mut entities = Vec::new();
        for entity in self.store.entities().await {
            let samples = self.store.history(&entity.id).await;
            let (fingerprint, previous_fingerprint) =
                match self.lineages.read().await.get(&entity.id).cloned() {
                    Some(lineage) => {
                        let lineage = lineage.lock().await;
                        (lineage.current().cloned(), lineage.previous().cloned())
                    }
                    None => (None, None),
                };
            entities.push(EntitySnapshot {
                entity,
                samples,
                fingerprint,
                previous_fingerprint,
            });
        }
        EngineSnapshot::new(entities)
    }

    /// Load state from a snapshot, replacing any state for the same entities
    ///
    /// Returns the number of samples restored.
    pub async fn restore(&self, snapshot: EngineSnapshot) -> usize {
        let mut restored = 0;
        for entry in snapshot.entities {
            restored += self.store.restore(&entry.entity, entry.samples).await;
            let lineage = Lineage::restored(
                self.feature_capacity,
                entry.fingerprint,
                entry.previous_fingerprint,
            );
            self.lineages
                .write()
                .await
                .insert(entry.entity.id, Arc::new(Mutex::new(lineage)));
        }
        tracing::info!(samples = restored, "Restored snapshot");
        restored
    }
}
