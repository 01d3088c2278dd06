//! Versioned binary snapshots of network state.
//!
//! Only the per-network records and the identifier counter are saved.
//! Membership is a property of the world and is rebuilt when nodes are seen
//! again after loading.

use serde::{Deserialize, Serialize};

use crate::energy::Ticks;
use crate::network::NetworkRecord;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a grid snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x56_47_52_44;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Header and payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick count when the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Everything needed to resume network state in a later session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub header: SnapshotHeader,
    /// Serial the next created network gets.
    pub next_serial: u64,
    pub records: Vec<NetworkRecord>,
}

impl GridSnapshot {
    pub fn new(tick: Ticks, next_serial: u64, records: Vec<NetworkRecord>) -> Self {
        Self {
            header: SnapshotHeader::new(tick),
            next_serial,
            records,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        bitcode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode and check the header.
    pub fn decode(data: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: GridSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::BlockPos;
    use crate::id::NetworkId;
    use crate::network::TickStats;

    fn sample() -> GridSnapshot {
        GridSnapshot::new(
            42,
            3,
            vec![NetworkRecord {
                id: NetworkId::new(2),
                anchor: Some(BlockPos::new(1, 64, -3)),
                active: true,
                stored_energy: 17,
                max_storage: 1000,
                last_tick: TickStats {
                    produced: 5,
                    demanded: 4,
                    consumed: 4,
                    into_storage: 1,
                    from_storage: 0,
                },
            }],
        )
    }

    #[test]
    fn encoded_snapshot_decodes() {
        let snapshot = sample();
        let bytes = snapshot.encode().unwrap();
        assert_eq!(GridSnapshot::decode(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut snapshot = sample();
        snapshot.header.magic = 0xDEAD_BEEF;
        let bytes = snapshot.encode().unwrap();
        assert!(matches!(
            GridSnapshot::decode(&bytes),
            Err(SnapshotError::InvalidMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn version_mismatch_rejected() {
        let mut snapshot = sample();
        snapshot.header.version = FORMAT_VERSION + 1;
        let bytes = snapshot.encode().unwrap();
        assert!(matches!(
            GridSnapshot::decode(&bytes),
            Err(SnapshotError::FutureVersion(_))
        ));

        snapshot.header.version = 0;
        let bytes = snapshot.encode().unwrap();
        assert!(matches!(
            GridSnapshot::decode(&bytes),
            Err(SnapshotError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let garbage = vec![0u8; 5];
        assert!(GridSnapshot::decode(&garbage).is_err());
    }
}
