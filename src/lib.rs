pub mod config;
pub mod error;
pub mod estimator;
pub mod hook;
pub mod store;
pub mod strategies;

pub use config::{PolicyKind, SelectorConfig};
pub use error::{ConfigError, SelectionError, StoreError};
pub use estimator::PerformanceEstimator;
pub use hook::InvocationHook;
pub use store::{CounterStore, MemoryStore, MetaKey, RecordStore};
pub use strategies::ReplicaSelectionPolicy;
