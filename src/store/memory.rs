use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use super::{RecordStore, StoreKey, Versioned, WriteBatch};
use crate::error::{StoreError, StoreResult};

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StoreKey, Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally overwrite `key`, returning its new version.
    pub fn put(&self, key: impl Into<StoreKey>, value: Value) -> u64 {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.into()).or_insert(Versioned {
            version: 0,
            value: Value::Null,
        });
        entry.version += 1;
        entry.value = value;
        entry.version
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn read(&self, key: &StoreKey) -> StoreResult<Option<Versioned>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut entries = self.entries.lock();

        for write in batch.writes() {
            let current = entries.get(&write.key).map_or(0, |e| e.version);
            if current != write.expected_version {
                return Err(StoreError::Conflict {
                    key: write.key.to_string(),
                });
            }
        }

        for write in batch.into_writes() {
            entries.insert(
                write.key,
                Versioned {
                    version: write.expected_version + 1,
                    value: write.value,
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MetaKey;
    use serde_json::json;

    #[test]
    fn test_read_absent_key() {
        let store = MemoryStore::new();
        assert!(store.read(&MetaKey::Load.into()).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_commit_bumps_versions() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(MetaKey::Load, 0, json!({"0": 10}));
        batch.put(StoreKey::field("A"), 0, json!([10.0, 50.0, -1.0]));
        store.commit(batch).unwrap();

        let load = store.read(&MetaKey::Load.into()).unwrap().unwrap();
        assert_eq!(load.version, 1);
        assert_eq!(load.value, json!({"0": 10}));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_conflict_applies_nothing() {
        let store = MemoryStore::new();
        store.put(MetaKey::Cost, json!({"0": 5}));

        let mut batch = WriteBatch::new();
        batch.put(MetaKey::Load, 0, json!({"0": 10}));
        batch.put(MetaKey::Cost, 0, json!({"0": 6}));

        let result = store.commit(batch);
        assert!(matches!(result, Err(StoreError::Conflict { key }) if key == "COST"));
        assert!(store.read(&MetaKey::Load.into()).unwrap().is_none());
        assert_eq!(
            store.read(&MetaKey::Cost.into()).unwrap().unwrap().value,
            json!({"0": 5})
        );
    }

    #[test]
    fn test_put_overwrites() {
        let store = MemoryStore::new();
        assert_eq!(store.put(MetaKey::Selected, json!([0])), 1);
        assert_eq!(store.put(MetaKey::Selected, json!([0, 1])), 2);
        let entry = store.read(&MetaKey::Selected.into()).unwrap().unwrap();
        assert_eq!(entry.value, json!([0, 1]));
    }
}
