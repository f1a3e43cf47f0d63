//! Sample source seam
//!
//! Process enumeration and measurement live outside the engine. Anything
//! that can list entities and sample one of them can drive a `Monitor`.

use crate::error::MonitorResult;
use crate::history::{Entity, EntityId, Sample};
use async_trait::async_trait;

/// Provider of memory samples
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Entities currently alive
    async fn list_entities(&self) -> MonitorResult<Vec<Entity>>;

    /// Measure one entity now
    ///
    /// Fails with `EntityGone` when the entity no longer exists.
    async fn sample(&self, id: &EntityId) -> MonitorResult<Sample>;

    /// Whether the source has nothing more to yield (finite sources only)
    fn is_exhausted(&self) -> bool {
        false
    }
}
