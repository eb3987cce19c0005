use tracing::warn;

use crate::error::SelectionResult;
use crate::store::CounterSnapshot;

/// Hosts are grouped in pairs; host `i` serves region `i / HOSTS_PER_REGION`.
pub const HOSTS_PER_REGION: usize = 2;

/// Region a host belongs to.
#[must_use]
pub fn region_of(host: usize) -> usize {
    host / HOSTS_PER_REGION
}

/// First host of a region.
#[must_use]
pub fn first_host(region: usize) -> usize {
    region * HOSTS_PER_REGION
}

/// Trait for abstracting replica selection policies.
pub trait ReplicaSelectionPolicy: Send + Sync {
    /// Choose a host for the snapshot's field and apply the resulting counter
    /// updates to the snapshot. Nothing is persisted here.
    fn select(&self, snapshot: &mut CounterSnapshot) -> SelectionResult<usize>;

    fn name(&self) -> &'static str;

    // Optional per-decision detail for trace logging (e.g., estimates)
    fn debug_snapshot(&self, _snapshot: &CounterSnapshot) -> Option<String> {
        None
    }
}

/// Give back the load held by the field's previous assignment.
///
/// Only the host recorded in the field's own vector is ever released. An
/// index outside the host table is ignored.
pub(crate) fn release_previous(
    snapshot: &mut CounterSnapshot,
    host_count: usize,
    unit: i64,
) -> Option<usize> {
    let previous = snapshot.field.get().assigned?;
    if previous >= host_count {
        warn!(
            field = snapshot.field_name(),
            host = previous,
            "ignoring stale assignment outside host table"
        );
        return None;
    }
    if snapshot.load.get_mut().release(previous, unit) {
        warn!(
            field = snapshot.field_name(),
            host = previous,
            "load release clamped at zero"
        );
    }
    Some(previous)
}

/// Charge `unit` of load to `host` and record it as the field's assignment.
pub(crate) fn assign(snapshot: &mut CounterSnapshot, host: usize, unit: i64) {
    snapshot.load.get_mut().add(host, unit);
    snapshot.field.get_mut().assigned = Some(host);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CounterStore, RecordLayout};

    fn snapshot() -> (CounterStore, RecordLayout) {
        (
            CounterStore::in_memory(),
            RecordLayout::new(vec![10.0, 50.0], 4),
        )
    }

    #[test]
    fn test_region_mapping() {
        for host in 0..8 {
            assert_eq!(region_of(host), host / 2);
            assert_eq!(region_of(first_host(region_of(host))), region_of(host));
        }
        assert_eq!(first_host(3), 6);
    }

    #[test]
    fn test_release_without_assignment_is_noop() {
        let (store, layout) = snapshot();
        let mut snap = store.read_snapshot("A", &layout).unwrap();
        assert_eq!(release_previous(&mut snap, 4, 10), None);
        assert!(!snap.load.is_dirty());
    }

    #[test]
    fn test_release_then_assign_nets_zero() {
        let (store, layout) = snapshot();
        let mut snap = store.read_snapshot("A", &layout).unwrap();
        assign(&mut snap, 1, 10);
        assert_eq!(snap.load.get().get(1), 10);

        assert_eq!(release_previous(&mut snap, 4, 10), Some(1));
        assign(&mut snap, 1, 10);
        assert_eq!(snap.load.get().get(1), 10);
        assert_eq!(snap.field.get().assigned, Some(1));
    }

    #[test]
    fn test_release_ignores_stale_index() {
        let (store, layout) = snapshot();
        let mut snap = store.read_snapshot("A", &layout).unwrap();
        snap.field.get_mut().assigned = Some(9);
        assert_eq!(release_previous(&mut snap, 4, 10), None);
        assert_eq!(snap.load.get().total(), 0);
    }
}
