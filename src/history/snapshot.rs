//! Engine snapshots
//!
//! Serializable copy of every entity's history and fingerprints, for hosts
//! that want state to survive a restart. Two encodings: JSON, and a compact
//! binary form.
//!
//! Binary layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (16 bytes)                       │
//! │   magic: [u8; 4] = "MDNA"               │
//! │   version: u16                          │
//! │   reserved: u16                         │
//! │   payload_len: u32                      │
//! │   payload_checksum: u32 (CRC32)         │
//! ├─────────────────────────────────────────┤
//! │ PAYLOAD                                 │
//! │   LZ4 (size-prepended) of bincode       │
//! └─────────────────────────────────────────┘
//! ```

use crate::analysis::Fingerprint;
use crate::error::{MonitorError, MonitorResult};
use crate::history::types::{Entity, Sample};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

const SNAPSHOT_MAGIC: [u8; 4] = *b"MDNA";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 16;

/// One entity's persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: Entity,
    /// History, oldest first
    pub samples: Vec<Sample>,
    pub fingerprint: Option<Fingerprint>,
    pub previous_fingerprint: Option<Fingerprint>,
}

/// Persisted state of the whole engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u16,
    /// Unix timestamp in milliseconds
    pub taken_at: i64,
    pub entities: Vec<EntitySnapshot>,
}

impl EngineSnapshot {
    pub fn new(entities: Vec<EntitySnapshot>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now().timestamp_millis(),
            entities,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.entities.iter().map(|e| e.samples.len()).sum()
    }

    pub fn to_json(&self) -> MonitorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MonitorResult<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Encode to the binary form
    pub fn to_bytes(&self) -> MonitorResult<Vec<u8>> {
        let encoded = bincode::serialize(self)?;
        let payload = lz4_flex::compress_prepend_size(&encoded);
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            MonitorError::Serialization(format!("snapshot too large: {} bytes", payload.len()))
        })?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode the binary form, verifying magic, version and checksum
    pub fn from_bytes(buf: &[u8]) -> MonitorResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(MonitorError::Corruption(format!(
                "snapshot truncated: {} bytes",
                buf.len()
            )));
        }

        if buf[0..4] != SNAPSHOT_MAGIC {
            return Err(MonitorError::Corruption(format!(
                "invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SNAPSHOT_VERSION {
            return Err(MonitorError::Corruption(format!(
                "unsupported version: {}",
                version
            )));
        }

        let payload_len = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        let stored_checksum = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);

        let payload = &buf[HEADER_SIZE..];
        if payload.len() != payload_len {
            return Err(MonitorError::Corruption(format!(
                "payload length mismatch: header={}, actual={}",
                payload_len,
                payload.len()
            )));
        }

        let computed_checksum = crc32fast::hash(payload);
        if stored_checksum != computed_checksum {
            return Err(MonitorError::Corruption(format!(
                "checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let decoded = lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| MonitorError::Compression(e.to_string()))?;
        let snapshot: Self = bincode::deserialize(&decoded)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Write the binary form to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> MonitorResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            entities = self.entities.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    fn check_version(&self) -> MonitorResult<()> {
        if self.version > SNAPSHOT_VERSION {
            return Err(MonitorError::Corruption(format!(
                "unsupported version: {}",
                self.version
            )));
        }
        Ok(())
    }
}
