//! Typed view of the selector state kept in a record store.
//!
//! LOAD and COST are per-host counters, SELECTED is the ordered set of active
//! regions and every tracked field carries a latency vector with the index of
//! the host it was last assigned to. Missing entries read as their default
//! state; they are only materialized by the first commit that changes them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MemoryStore, MetaKey, RecordStore, StoreKey, WriteBatch};
use crate::config::SelectorConfig;
use crate::error::{StoreError, StoreResult};

/// Stored in the assigned slot when a field has no host yet.
pub const UNASSIGNED: f64 = -1.0;

/// Counter value per host index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostCounters(BTreeMap<usize, i64>);

impl HostCounters {
    /// Value for `host`, zero when never written.
    #[must_use]
    pub fn get(&self, host: usize) -> i64 {
        self.0.get(&host).copied().unwrap_or(0)
    }

    /// Add `delta` to `host`, saturating at the `i64` bounds.
    pub fn add(&mut self, host: usize, delta: i64) {
        let value = self.0.entry(host).or_insert(0);
        *value = value.saturating_add(delta);
    }

    /// Take `unit` off `host`, stopping at zero. Returns whether it had to clamp.
    pub fn release(&mut self, host: usize, unit: i64) -> bool {
        let current = self.get(host);
        let clamped = current < unit;
        self.0.insert(host, current.saturating_sub(unit).max(0));
        clamped
    }

    /// Sum over all hosts, saturating.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.0.values().fold(0i64, |sum, &v| sum.saturating_add(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.0.iter().map(|(&h, &v)| (h, v))
    }
}

/// Regions currently active for a record, in admission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectedRegionSet(Vec<usize>);

impl SelectedRegionSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, region: usize) -> bool {
        self.0.contains(&region)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Add `region` unless it is already present or the set holds `capacity` regions.
    pub fn admit(&mut self, region: usize, capacity: usize) -> bool {
        if self.contains(region) || self.len() >= capacity {
            return false;
        }
        self.0.push(region);
        true
    }
}

/// Shape of a field's latency vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    baselines: Vec<f64>,
    assigned_slot: usize,
}

impl RecordLayout {
    /// `assigned_slot` is moved past the latency entries if it would overlap them.
    #[must_use]
    pub fn new(baselines: Vec<f64>, assigned_slot: usize) -> Self {
        let assigned_slot = assigned_slot.max(baselines.len());
        Self {
            baselines,
            assigned_slot,
        }
    }

    #[must_use]
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self::new(config.region_baselines.clone(), config.assigned_slot)
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.baselines.len()
    }

    #[must_use]
    pub fn assigned_slot(&self) -> usize {
        self.assigned_slot
    }
}

/// Per-field latency estimates and the host the field was last assigned to.
///
/// Entries of the stored vector outside the latencies and the assigned slot
/// are kept as read and written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLatencyRecord {
    pub latencies: Vec<f64>,
    pub assigned: Option<usize>,
    stored: Vec<f64>,
}

impl FieldLatencyRecord {
    /// Record for a field that has never been served.
    #[must_use]
    pub fn unassigned(layout: &RecordLayout) -> Self {
        Self {
            latencies: layout.baselines.clone(),
            assigned: None,
            stored: Vec::new(),
        }
    }

    /// Decode a stored vector. Missing latency entries fall back to the baselines.
    #[must_use]
    pub fn from_vector(values: &[f64], layout: &RecordLayout) -> Self {
        let latencies = layout
            .baselines
            .iter()
            .enumerate()
            .map(|(region, &baseline)| values.get(region).copied().unwrap_or(baseline))
            .collect();
        let assigned = values
            .get(layout.assigned_slot)
            .copied()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as usize);
        Self {
            latencies,
            assigned,
            stored: values.to_vec(),
        }
    }

    /// Encode as a flat vector with the assigned host at the layout's slot.
    /// Gaps before the slot are zero-filled.
    #[must_use]
    pub fn to_vector(&self, layout: &RecordLayout) -> Vec<f64> {
        let mut values = self.stored.clone();
        if values.len() <= layout.assigned_slot {
            values.resize(layout.assigned_slot + 1, 0.0);
        }
        for (slot, latency) in values.iter_mut().zip(&self.latencies) {
            *slot = *latency;
        }
        values[layout.assigned_slot] = self.assigned.map_or(UNASSIGNED, |h| h as f64);
        values
    }
}

/// A value read from the store together with its version.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    version: u64,
    value: T,
    dirty: bool,
}

impl<T> Tracked<T> {
    fn new(version: u64, value: T) -> Self {
        Self {
            version,
            value,
            dirty: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutable access; marks the value for write-back.
    pub fn get_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Everything one selection reads, and may write back.
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    field_name: String,
    layout: RecordLayout,
    pub load: Tracked<HostCounters>,
    pub cost: Tracked<HostCounters>,
    pub selected: Tracked<SelectedRegionSet>,
    pub field: Tracked<FieldLatencyRecord>,
}

impl CounterSnapshot {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Conditional writes for every entry that was modified.
    fn write_batch(&self) -> StoreResult<WriteBatch> {
        let mut batch = WriteBatch::new();
        if self.load.is_dirty() {
            batch.put(MetaKey::Load, self.load.version, encode(MetaKey::Load, self.load.get())?);
        }
        if self.cost.is_dirty() {
            batch.put(MetaKey::Cost, self.cost.version, encode(MetaKey::Cost, self.cost.get())?);
        }
        if self.selected.is_dirty() {
            batch.put(
                MetaKey::Selected,
                self.selected.version,
                encode(MetaKey::Selected, self.selected.get())?,
            );
        }
        if self.field.is_dirty() {
            let key = StoreKey::field(self.field_name.clone());
            let vector = self.field.get().to_vector(&self.layout);
            let value = serde_json::to_value(vector).map_err(|e| StoreError::Codec {
                key: key.to_string(),
                source: e,
            })?;
            batch.put(key, self.field.version, value);
        }
        Ok(batch)
    }
}

/// Current LOAD, COST and SELECTED contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterState {
    pub load: HostCounters,
    pub cost: HostCounters,
    pub selected: SelectedRegionSet,
}

/// Typed adapter over a [`RecordStore`].
pub struct CounterStore {
    backend: Arc<dyn RecordStore>,
    record_lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(backend: Arc<dyn RecordStore>) -> Self {
        Self {
            backend,
            record_lock: Mutex::new(()),
        }
    }

    /// Adapter over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Serializes read, decide, commit sequences on this record within the process.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.record_lock.lock()
    }

    /// Read everything a selection for `field_name` needs.
    ///
    /// # Errors
    ///
    /// Propagates backend failures and returns [`StoreError::Codec`] for
    /// entries that do not decode.
    pub fn read_snapshot(
        &self,
        field_name: &str,
        layout: &RecordLayout,
    ) -> StoreResult<CounterSnapshot> {
        let field = match self.backend.read(&StoreKey::field(field_name))? {
            Some(entry) => {
                let values: Vec<f64> = decode(&StoreKey::field(field_name), entry.value)?;
                Tracked::new(entry.version, FieldLatencyRecord::from_vector(&values, layout))
            }
            None => Tracked::new(0, FieldLatencyRecord::unassigned(layout)),
        };

        Ok(CounterSnapshot {
            field_name: field_name.to_string(),
            layout: layout.clone(),
            load: self.read_meta(MetaKey::Load)?,
            cost: self.read_meta(MetaKey::Cost)?,
            selected: self.read_meta(MetaKey::Selected)?,
            field,
        })
    }

    /// Write back every modified entry of `snapshot` in one conditional batch.
    /// Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if another writer got there first; in
    /// that case nothing was written.
    pub fn commit(&self, snapshot: &CounterSnapshot) -> StoreResult<usize> {
        let batch = snapshot.write_batch()?;
        let written = batch.len();
        if !batch.is_empty() {
            self.backend.commit(batch)?;
        }
        Ok(written)
    }

    /// Current LOAD, COST and SELECTED.
    ///
    /// # Errors
    ///
    /// Propagates backend and decoding failures.
    pub fn state(&self) -> StoreResult<CounterState> {
        Ok(CounterState {
            load: self.read_meta::<HostCounters>(MetaKey::Load)?.value,
            cost: self.read_meta::<HostCounters>(MetaKey::Cost)?.value,
            selected: self.read_meta::<SelectedRegionSet>(MetaKey::Selected)?.value,
        })
    }

    /// Latency record of `field_name` as currently stored.
    ///
    /// # Errors
    ///
    /// Propagates backend and decoding failures.
    pub fn field_record(
        &self,
        field_name: &str,
        layout: &RecordLayout,
    ) -> StoreResult<FieldLatencyRecord> {
        Ok(self.read_snapshot(field_name, layout)?.field.value)
    }

    fn read_meta<T: DeserializeOwned + Default>(&self, key: MetaKey) -> StoreResult<Tracked<T>> {
        let key = StoreKey::from(key);
        match self.backend.read(&key)? {
            Some(entry) => Ok(Tracked::new(entry.version, decode(&key, entry.value)?)),
            None => Ok(Tracked::new(0, T::default())),
        }
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore").finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(key: &StoreKey, value: Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Codec {
        key: key.to_string(),
        source: e,
    })
}

fn encode<T: Serialize>(key: MetaKey, value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Codec {
        key: key.as_str().to_string(),
        source: e,
    })
}
