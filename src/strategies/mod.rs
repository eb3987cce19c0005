pub mod cost_aware;
pub mod random;
pub mod resource_constrained;
pub mod strategy;

use std::sync::Arc;

use crate::config::{PolicyKind, SelectorConfig};

pub use cost_aware::CostAwareStrategy;
pub use resource_constrained::ResourceConstrainedStrategy;
pub use strategy::{region_of, ReplicaSelectionPolicy};

/// Policy configured by `config.policy`.
pub fn build_policy(config: Arc<SelectorConfig>) -> Arc<dyn ReplicaSelectionPolicy> {
    match config.policy {
        PolicyKind::CostAware => Arc::new(CostAwareStrategy::new(config)),
        PolicyKind::ResourceConstrained => Arc::new(ResourceConstrainedStrategy::new(config)),
    }
}
