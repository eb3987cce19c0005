//! Entry point invoked on every read of a tracked field.
//!
//! Reserved meta-fields pass straight through. Any other field gets a host
//! chosen by the configured policy; the decision and all counter updates are
//! committed as one conditional batch, and the chosen host identifier becomes
//! the field's new value.
//!
//! The field's latency vector and the value served to the reader are separate:
//! the vector lives in the [`CounterStore`] under the field's name and is only
//! written by the hook, while the returned host identifier goes back to the
//! reader. Callers must not persist the returned value under the field's key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, enabled, trace, warn, Level};

use crate::config::SelectorConfig;
use crate::error::{ConfigResult, SelectionError, SelectionResult, StoreError};
use crate::store::{CounterStore, MetaKey, RecordLayout};
use crate::strategies::{build_policy, ReplicaSelectionPolicy};

pub struct InvocationHook {
    config: Arc<SelectorConfig>,
    layout: RecordLayout,
    policy: Arc<dyn ReplicaSelectionPolicy>,
    invocations: Arc<AtomicU64>,
}

impl InvocationHook {
    /// Validate `config` and build the policy it names.
    ///
    /// # Errors
    ///
    /// Returns the validation error for a malformed configuration.
    pub fn new(config: SelectorConfig) -> ConfigResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let policy = build_policy(Arc::clone(&config));
        Ok(Self::with_policy(config, policy))
    }

    /// Hook around an explicit policy. `config` is assumed valid; a host index
    /// the policy returns outside the host table fails the selection with
    /// [`SelectionError::UnknownHost`] before anything is committed.
    pub fn with_policy(
        config: Arc<SelectorConfig>,
        policy: Arc<dyn ReplicaSelectionPolicy>,
    ) -> Self {
        Self {
            layout: RecordLayout::from_config(&config),
            config,
            policy,
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Number of selections attempted, meta-field reads excluded.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Handle a read of `field` whose stored value is `value`.
    ///
    /// Returns `value` unchanged for reserved meta-fields, otherwise the
    /// identifier of the chosen host. For tracked fields `value` is not
    /// consulted: the latency vector is read from `store`.
    ///
    /// # Errors
    ///
    /// See [`select_host`](Self::select_host).
    pub fn invoke(
        &self,
        value: &Value,
        field: &str,
        store: &CounterStore,
    ) -> SelectionResult<Value> {
        if let Some(meta) = MetaKey::from_field(field) {
            trace!(field = meta.as_str(), "meta-field read bypasses selection");
            return Ok(value.clone());
        }
        let host = self.select_host(field, store)?;
        Ok(Value::String(self.replica(host)?.to_string()))
    }

    /// Choose a host for `field` and commit the counter updates.
    ///
    /// The whole read, decide, commit sequence is retried on a write conflict
    /// or an unavailable store, up to `max_retries` attempts. A failed attempt
    /// writes nothing.
    ///
    /// # Errors
    ///
    /// - [`SelectionError::SelectionFailed`] once the retries are used up
    /// - [`SelectionError::NoCandidateRegion`] or [`SelectionError::OutOfRange`]
    ///   from the policy
    /// - [`SelectionError::Store`] for non-retryable store failures
    pub fn select_host(&self, field: &str, store: &CounterStore) -> SelectionResult<usize> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let mut last: Option<StoreError> = None;
        for attempt in 1..=self.config.max_retries {
            match self.attempt(field, store) {
                Ok(host) => {
                    debug!(
                        field,
                        host,
                        replica = self.replica(host).unwrap_or("?"),
                        policy = self.policy.name(),
                        attempt,
                        "replica selected"
                    );
                    return Ok(host);
                }
                Err(SelectionError::Store(e)) if e.is_retryable() => {
                    warn!(field, attempt, error = %e, "selection attempt aborted, retrying");
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(SelectionError::SelectionFailed {
            attempts: self.config.max_retries,
            last: last.unwrap_or_else(|| StoreError::Unavailable("no attempt made".to_string())),
        })
    }

    fn attempt(&self, field: &str, store: &CounterStore) -> SelectionResult<usize> {
        let _guard = store.lock();
        let mut snapshot = store.read_snapshot(field, &self.layout)?;

        if enabled!(Level::TRACE) {
            if let Some(detail) = self.policy.debug_snapshot(&snapshot) {
                trace!(field, "{}", detail);
            }
        }

        let host = self.policy.select(&mut snapshot)?;
        self.replica(host)?;
        store.commit(&snapshot)?;
        Ok(host)
    }

    fn replica(&self, host: usize) -> SelectionResult<&str> {
        self.config
            .hosts
            .get(host)
            .map(String::as_str)
            .ok_or(SelectionError::UnknownHost {
                host,
                hosts: self.config.hosts.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyKind;
    use crate::store::{CounterSnapshot, CounterState};
    use serde_json::json;

    /// Policy that charges load to a fixed host index, in range or not.
    struct FixedHost(usize);

    impl ReplicaSelectionPolicy for FixedHost {
        fn select(&self, snapshot: &mut CounterSnapshot) -> SelectionResult<usize> {
            snapshot.load.get_mut().add(self.0, 10);
            snapshot.field.get_mut().assigned = Some(self.0);
            Ok(self.0)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn test_meta_fields_pass_through() {
        let hook = InvocationHook::new(SelectorConfig::default()).unwrap();
        let store = CounterStore::in_memory();

        for meta in MetaKey::ALL {
            let value = json!({"0": 42});
            let result = hook.invoke(&value, meta.as_str(), &store).unwrap();
            assert_eq!(result, value);
        }
        assert_eq!(hook.invocations(), 0);
        assert_eq!(store.state().unwrap(), CounterState::default());
    }

    #[test]
    fn test_invoke_returns_host_identifier() {
        let hook = InvocationHook::new(SelectorConfig::default()).unwrap();
        let store = CounterStore::in_memory();
        let result = hook.invoke(&Value::Null, "A", &store).unwrap();
        assert_eq!(result, json!("replica-1:8080"));
        assert_eq!(hook.invocations(), 1);
    }

    #[test]
    fn test_policy_follows_config() {
        let hook = InvocationHook::new(SelectorConfig {
            policy: PolicyKind::ResourceConstrained,
            ..SelectorConfig::default()
        })
        .unwrap();
        assert_eq!(hook.policy_name(), "resource-constrained");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = InvocationHook::new(SelectorConfig {
            performance_curve: vec![0.0, 1.0],
            ..SelectorConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_host_outside_table_commits_nothing() {
        let hook = InvocationHook::with_policy(
            Arc::new(SelectorConfig::default()),
            Arc::new(FixedHost(9)),
        );
        let store = CounterStore::in_memory();
        assert!(matches!(
            hook.invoke(&Value::Null, "A", &store),
            Err(SelectionError::UnknownHost { host: 9, hosts: 4 })
        ));
        assert_eq!(store.state().unwrap(), CounterState::default());
        assert_eq!(store.field_record("A", hook.layout()).unwrap().assigned, None);

        let hook = InvocationHook::with_policy(
            Arc::new(SelectorConfig::default()),
            Arc::new(FixedHost(3)),
        );
        assert_eq!(hook.invoke(&Value::Null, "A", &store).unwrap(), json!("replica-4:8080"));
    }

    #[test]
    fn test_policy_error_not_retried() {
        let hook = InvocationHook::new(SelectorConfig {
            policy: PolicyKind::ResourceConstrained,
            resource_threshold: 0,
            ..SelectorConfig::default()
        })
        .unwrap();
        let store = CounterStore::in_memory();
        assert!(matches!(
            hook.invoke(&Value::Null, "A", &store),
            Err(SelectionError::NoCandidateRegion)
        ));
        assert_eq!(store.state().unwrap(), CounterState::default());
    }
}
