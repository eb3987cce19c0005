//! Record store abstraction.
//!
//! A record store is the per-record key-value map the selector keeps its
//! counters in. Reads are versioned and writes are conditional: a
//! [`WriteBatch`] is applied only if every key in it is still at the version
//! it was read at, and either all of it lands or none of it does.

pub mod counters;
pub mod keys;
pub mod memory;

pub use counters::{
    CounterSnapshot, CounterState, CounterStore, FieldLatencyRecord, HostCounters, RecordLayout,
    SelectedRegionSet, UNASSIGNED,
};
pub use keys::{MetaKey, StoreKey};
pub use memory::MemoryStore;

use crate::error::StoreResult;
use serde_json::Value;

/// A stored value with the version it was read at. Absent keys are version 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub value: Value,
}

/// One conditional write.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub key: StoreKey,
    pub expected_version: u64,
    pub value: Value,
}

/// Writes committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<PendingWrite>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for `key`, expecting the key to still be at `expected_version`.
    pub fn put(&mut self, key: impl Into<StoreKey>, expected_version: u64, value: Value) {
        self.writes.push(PendingWrite {
            key: key.into(),
            expected_version,
            value,
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<PendingWrite> {
        self.writes
    }
}

/// Backend holding one record's entries.
pub trait RecordStore: Send + Sync {
    /// Current value of `key`, or `None` if it has never been written.
    fn read(&self, key: &StoreKey) -> StoreResult<Option<Versioned>>;

    /// Apply every write in `batch` atomically.
    ///
    /// Fails with [`StoreError::Conflict`](crate::error::StoreError::Conflict)
    /// without applying anything if any key has moved past its expected version.
    fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
