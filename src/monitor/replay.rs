//! CSV replay source
//!
//! Plays back recorded samples one frame per tick. A frame is every row
//! sharing a timestamp. Expected header:
//!
//! ```text
//! timestamp_ms,pid,start_time,name,rss,vms,percent,shared,data,stack,cached,total,swap_used,swap_total
//! ```
//!
//! `pid` 0 (or empty) is the system entity. The breakdown columns are
//! optional and may be left empty.

use crate::error::{MonitorError, MonitorResult};
use crate::history::{
    Entity, EntityId, Sample, BREAKDOWN_CACHED, BREAKDOWN_DATA, BREAKDOWN_SHARED,
    BREAKDOWN_STACK, BREAKDOWN_SWAP_TOTAL, BREAKDOWN_SWAP_USED, BREAKDOWN_TOTAL,
};
use crate::monitor::source::SampleSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Deserialize)]
struct ReplayRow {
    timestamp_ms: i64,
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    start_time: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    rss: u64,
    #[serde(default)]
    vms: Option<u64>,
    percent: f64,
    #[serde(default)]
    shared: Option<u64>,
    #[serde(default)]
    data: Option<u64>,
    #[serde(default)]
    stack: Option<u64>,
    #[serde(default)]
    cached: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    swap_used: Option<u64>,
    #[serde(default)]
    swap_total: Option<u64>,
}

impl ReplayRow {
    fn into_entry(self) -> (Entity, Sample) {
        let entity = match self.pid.unwrap_or(0) {
            0 => Entity::system(),
            pid => {
                let id = EntityId::process(pid, self.start_time.unwrap_or(0));
                let name = self.name.clone().unwrap_or_else(|| format!("pid-{}", pid));
                Entity::new(id, name)
            }
        };

        let mut sample = Sample::with_timestamp(entity.id, self.timestamp_ms, self.rss, self.percent)
            .virtual_bytes(self.vms.unwrap_or(self.rss));

        let categories = [
            (BREAKDOWN_SHARED, self.shared),
            (BREAKDOWN_DATA, self.data),
            (BREAKDOWN_STACK, self.stack),
            (BREAKDOWN_CACHED, self.cached),
            (BREAKDOWN_TOTAL, self.total),
            (BREAKDOWN_SWAP_USED, self.swap_used),
            (BREAKDOWN_SWAP_TOTAL, self.swap_total),
        ];
        for (key, value) in categories {
            if let Some(bytes) = value {
                sample = sample.category(key, bytes);
            }
        }

        (entity, sample)
    }
}

type Frame = HashMap<EntityId, (Entity, Sample)>;

/// Replays recorded samples frame by frame
pub struct CsvReplaySource {
    frames: Vec<Frame>,
    /// Index of the frame served by `sample`; advanced by `list_entities`
    cursor: Mutex<Option<usize>>,
    exhausted: AtomicBool,
    rows_skipped: usize,
}

impl CsvReplaySource {
    pub fn from_path(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let source = Self::from_reader(file)?;
        tracing::info!(
            path = %path.as_ref().display(),
            frames = source.frames.len(),
            skipped = source.rows_skipped,
            "Loaded replay"
        );
        Ok(source)
    }

    pub fn from_reader<R: Read>(reader: R) -> MonitorResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        let mut rows_skipped = 0;

        for (line_num, result) in reader.deserialize::<ReplayRow>().enumerate() {
            match result {
                Ok(row) => entries.push(row.into_entry()),
                Err(e) => {
                    tracing::warn!(line = line_num + 2, error = %e, "Skipping replay row");
                    rows_skipped += 1;
                }
            }
        }

        let mut source = Self::from_entries(entries);
        source.rows_skipped = rows_skipped;
        Ok(source)
    }

    /// Build from in-memory entries, grouped into frames by timestamp
    pub fn from_entries(entries: impl IntoIterator<Item = (Entity, Sample)>) -> Self {
        let mut by_time: BTreeMap<i64, Frame> = BTreeMap::new();
        for (entity, sample) in entries {
            by_time
                .entry(sample.timestamp)
                .or_default()
                .insert(entity.id, (entity, sample));
        }

        Self {
            frames: by_time.into_values().collect(),
            cursor: Mutex::new(None),
            exhausted: AtomicBool::new(false),
            rows_skipped: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped
    }
}

#[async_trait]
impl SampleSource for CsvReplaySource {
    fn name(&self) -> &str {
        "csv_replay"
    }

    async fn list_entities(&self) -> MonitorResult<Vec<Entity>> {
        let mut cursor = self.cursor.lock().await;
        let next = cursor.map_or(0, |c| c + 1);

        if next >= self.frames.len() {
            self.exhausted.store(true, Ordering::SeqCst);
            *cursor = Some(self.frames.len());
            return Ok(Vec::new());
        }

        *cursor = Some(next);
        let mut entities: Vec<Entity> = self.frames[next]
            .values()
            .map(|(entity, _)| entity.clone())
            .collect();
        entities.sort_by_key(|e| e.id);
        Ok(entities)
    }

    async fn sample(&self, id: &EntityId) -> MonitorResult<Sample> {
        let cursor = *self.cursor.lock().await;
        cursor
            .and_then(|c| self.frames.get(c))
            .and_then(|frame| frame.get(id))
            .map(|(_, sample)| sample.clone())
            .ok_or(MonitorError::EntityGone(*id))
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}
