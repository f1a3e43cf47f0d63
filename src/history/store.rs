//! History Store
//!
//! Bounded, time-ordered ring of samples per entity, with its rolling
//! baseline maintained alongside.
//!
//! Locking is two-level: the entity map is behind one `RwLock` and each
//! entity's ring behind its own, so entities never contend with each other
//! while a reader of one entity never observes a half-evicted ring.

use crate::error::{MonitorError, MonitorResult};
use crate::history::baseline::Baseline;
use crate::history::types::{Entity, EntityId, Sample};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default ring capacity per entity
pub const DEFAULT_CAPACITY: usize = 200;

/// Ring and baseline for one entity
#[derive(Debug)]
struct EntityHistory {
    name: String,
    samples: VecDeque<Sample>,
    baseline: Baseline,
}

impl EntityHistory {
    fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            samples: VecDeque::with_capacity(capacity),
            baseline: Baseline::new(),
        }
    }

    fn last_timestamp(&self) -> Option<i64> {
        self.samples.back().map(|s| s.timestamp)
    }
}

/// What happened when a sample was recorded
#[derive(Debug, Clone)]
pub struct RecordReceipt {
    /// Baseline as it stood before this sample was added
    pub prior_baseline: Baseline,
    /// History length after the insert
    pub len: usize,
    /// Sample dropped to make room, if the ring was full
    pub evicted: Option<Sample>,
    /// Whether this sample created the entity
    pub created: bool,
}

/// Per-entity bounded sample history
pub struct HistoryStore {
    capacity: usize,
    entities: RwLock<HashMap<EntityId, Arc<RwLock<EntityHistory>>>>,
}

impl HistoryStore {
    /// Create a store holding at most `capacity` samples per entity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn get(&self, id: &EntityId) -> Option<Arc<RwLock<EntityHistory>>> {
        self.entities.read().await.get(id).cloned()
    }

    async fn get_or_create(&self, entity: &Entity) -> (Arc<RwLock<EntityHistory>>, bool) {
        if let Some(existing) = self.get(&entity.id).await {
            return (existing, false);
        }

        let mut entities = self.entities.write().await;
        let mut created = false;
        let handle = entities
            .entry(entity.id)
            .or_insert_with(|| {
                created = true;
                Arc::new(RwLock::new(EntityHistory::new(&entity.name, self.capacity)))
            })
            .clone();
        (handle, created)
    }

    /// Append a sample to an entity's history
    ///
    /// Rejects samples whose timestamp is not strictly after the last recorded
    /// one. On overflow the oldest sample is evicted.
    pub async fn record(&self, entity: &Entity, sample: Sample) -> MonitorResult<RecordReceipt> {
        if sample.entity_id != entity.id {
            return Err(MonitorError::Source(format!(
                "sample for {} recorded under {}",
                sample.entity_id, entity.id
            )));
        }

        let (handle, created) = self.get_or_create(entity).await;
        let mut history = handle.write().await;

        if let Some(last) = history.last_timestamp() {
            if sample.timestamp <= last {
                return Err(MonitorError::OutOfOrderSample {
                    entity: entity.id,
                    timestamp: sample.timestamp,
                    last,
                });
            }
        }

        if history.name != entity.name {
            history.name = entity.name.clone();
        }

        let prior_baseline = history.baseline;

        let evicted = if history.samples.len() >= self.capacity {
            history.samples.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            history.baseline.evict(old);
        }

        history.baseline.observe(&sample);
        history.samples.push_back(sample);

        Ok(RecordReceipt {
            prior_baseline,
            len: history.samples.len(),
            evicted,
            created,
        })
    }

    /// Last `n` samples, oldest first (fewer if the history is shorter)
    pub async fn window(&self, id: &EntityId, n: usize) -> Vec<Sample> {
        let Some(handle) = self.get(id).await else {
            return Vec::new();
        };
        let history = handle.read().await;
        let skip = history.samples.len().saturating_sub(n);
        history.samples.iter().skip(skip).cloned().collect()
    }

    /// Full history, oldest first
    pub async fn history(&self, id: &EntityId) -> Vec<Sample> {
        self.window(id, self.capacity).await
    }

    pub async fn latest(&self, id: &EntityId) -> Option<Sample> {
        let handle = self.get(id).await?;
        let history = handle.read().await;
        history.samples.back().cloned()
    }

    pub async fn baseline(&self, id: &EntityId) -> Option<Baseline> {
        let handle = self.get(id).await?;
        let history = handle.read().await;
        Some(history.baseline)
    }

    pub async fn name(&self, id: &EntityId) -> Option<String> {
        let handle = self.get(id).await?;
        let history = handle.read().await;
        Some(history.name.clone())
    }

    pub async fn contains(&self, id: &EntityId) -> bool {
        self.entities.read().await.contains_key(id)
    }

    /// All tracked entities, in id order
    pub async fn entities(&self) -> Vec<Entity> {
        let handles: Vec<(EntityId, Arc<RwLock<EntityHistory>>)> = self
            .entities
            .read()
            .await
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();

        let mut entities = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let name = handle.read().await.name.clone();
            entities.push(Entity::new(id, name));
        }
        entities.sort_by_key(|e| e.id);
        entities
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Drop an entity and its history
    pub async fn remove(&self, id: &EntityId) -> bool {
        self.entities.write().await.remove(id).is_some()
    }

    /// Clear an entity's history and baseline, keeping the entity
    pub async fn reset(&self, id: &EntityId) {
        if let Some(handle) = self.get(id).await {
            let mut history = handle.write().await;
            history.samples.clear();
            history.baseline = Baseline::new();
        }
    }

    /// Replace an entity's history wholesale (snapshot restore)
    ///
    /// Samples that break timestamp ordering are skipped; only the newest
    /// `capacity` are kept. The baseline is rebuilt from what remains.
    /// Returns the number of samples retained.
    pub async fn restore(&self, entity: &Entity, samples: Vec<Sample>) -> usize {
        let mut ordered: VecDeque<Sample> = VecDeque::with_capacity(self.capacity);
        for sample in samples {
            if sample.entity_id != entity.id {
                continue;
            }
            if let Some(last) = ordered.back() {
                if sample.timestamp <= last.timestamp {
                    tracing::warn!(
                        entity = %entity.id,
                        timestamp = sample.timestamp,
                        "Skipping out-of-order sample in restored history"
                    );
                    continue;
                }
            }
            if ordered.len() >= self.capacity {
                ordered.pop_front();
            }
            ordered.push_back(sample);
        }

        let history = EntityHistory {
            name: entity.name.clone(),
            baseline: Baseline::from_samples(ordered.iter()),
            samples: ordered,
        };
        let retained = history.samples.len();

        self.entities
            .write()
            .await
            .insert(entity.id, Arc::new(RwLock::new(history)));
        retained
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
