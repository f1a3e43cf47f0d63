//! Sample History
//!
//! Per-entity bounded sample rings and the rolling baselines maintained
//! alongside them:
//!
//! - **types**: entity identity and the immutable `Sample`
//! - **baseline**: incrementally maintained mean/stddev
//! - **store**: the concurrent `HistoryStore`
//! - **snapshot**: serializable engine state

pub mod baseline;
pub mod snapshot;
pub mod store;
pub mod types;

pub use baseline::{Baseline, RunningStats};
pub use snapshot::{EngineSnapshot, EntitySnapshot, SNAPSHOT_VERSION};
pub use store::{HistoryStore, RecordReceipt, DEFAULT_CAPACITY};
pub use types::{
    Entity, EntityId, Sample, BREAKDOWN_CACHED, BREAKDOWN_DATA, BREAKDOWN_SHARED,
    BREAKDOWN_STACK, BREAKDOWN_SWAP_TOTAL, BREAKDOWN_SWAP_USED, BREAKDOWN_TOTAL,
};
