//! Cost-aware replica selection.
//!
//! Every host whose estimated latency at its projected load stays under the
//! performance threshold is admissible. Among those, the host that has already
//! accrued the most cost wins, first found on ties. With nothing admissible the
//! lowest-baseline region is tried under the replica threshold, and failing
//! that a host is drawn uniformly at random.

use std::sync::Arc;

use tracing::{debug, trace};

use super::random::RandomStrategy;
use super::strategy::{
    assign, first_host, region_of, release_previous, ReplicaSelectionPolicy, HOSTS_PER_REGION,
};
use crate::config::SelectorConfig;
use crate::error::{SelectionError, SelectionResult};
use crate::estimator::PerformanceEstimator;
use crate::store::CounterSnapshot;

pub struct CostAwareStrategy {
    config: Arc<SelectorConfig>,
    estimator: PerformanceEstimator,
    fallback: RandomStrategy,
}

impl CostAwareStrategy {
    pub fn new(config: Arc<SelectorConfig>) -> Self {
        let estimator = PerformanceEstimator::from_config(&config);
        Self {
            config,
            estimator,
            fallback: RandomStrategy::new(),
        }
    }

    /// Estimated latency per host at its load plus one unit. Hosts beyond the
    /// curve, or whose projected load overflows, have no estimate.
    fn host_estimates(&self, snapshot: &CounterSnapshot) -> Vec<Option<f64>> {
        let load = snapshot.load.get();
        let latencies = &snapshot.field.get().latencies;
        (0..self.config.hosts.len())
            .map(|host| {
                let Some(projected) = load.get(host).checked_add(self.config.load_unit) else {
                    debug!(host, load = load.get(host), "projected load overflows");
                    return None;
                };
                match self.estimator.estimate(region_of(host), projected, latencies) {
                    Ok(estimate) => Some(estimate),
                    Err(e) => {
                        debug!(host, error = %e, "host not admissible");
                        None
                    }
                }
            })
            .collect()
    }

    /// Admissible host with the highest cost.
    fn best_admissible(&self, snapshot: &CounterSnapshot) -> Option<usize> {
        let cost = snapshot.cost.get();
        let mut best: Option<(usize, i64)> = None;

        for (host, estimate) in self.host_estimates(snapshot).into_iter().enumerate() {
            let Some(estimate) = estimate else { continue };
            if estimate >= self.config.performance_threshold {
                continue;
            }
            let host_cost = cost.get(host);
            match best {
                None => best = Some((host, host_cost)),
                Some((_, best_cost)) if host_cost > best_cost => best = Some((host, host_cost)),
                _ => {}
            }
        }

        best.map(|(host, _)| host)
    }

    /// First host of the lowest-baseline region still under the replica threshold.
    fn best_region_host(&self, snapshot: &CounterSnapshot) -> Option<usize> {
        let region = self
            .config
            .region_baselines
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (region, &baseline)| match best {
                Some((_, b)) if b <= baseline => best,
                _ => Some((region, baseline)),
            })
            .map(|(region, _)| region)?;

        let load = snapshot.load.get();
        let start = first_host(region);
        (start..start + HOSTS_PER_REGION)
            .filter(|&host| host < self.config.hosts.len())
            .find(|&host| {
                load.get(host)
                    .checked_add(self.config.load_unit)
                    .is_some_and(|projected| projected < self.config.replica_threshold)
            })
    }
}

impl ReplicaSelectionPolicy for CostAwareStrategy {
    fn select(&self, snapshot: &mut CounterSnapshot) -> SelectionResult<usize> {
        let unit = self.config.load_unit;
        release_previous(snapshot, self.config.hosts.len(), unit);

        let host = if let Some(host) = self.best_admissible(snapshot) {
            debug!(field = snapshot.field_name(), host, "admitted under performance threshold");
            host
        } else if let Some(host) = self.best_region_host(snapshot) {
            debug!(field = snapshot.field_name(), host, "falling back to best region");
            host
        } else {
            let host = self
                .fallback
                .pick_host(self.config.hosts.len())
                .ok_or(SelectionError::NoCandidateRegion)?;
            debug!(field = snapshot.field_name(), host, "falling back to random host");
            host
        };

        trace!(field = snapshot.field_name(), host, "cost-aware decision");
        assign(snapshot, host, unit);
        snapshot
            .cost
            .get_mut()
            .add(host, self.config.cost_increment());
        Ok(host)
    }

    fn name(&self) -> &'static str {
        "cost-aware"
    }

    fn debug_snapshot(&self, snapshot: &CounterSnapshot) -> Option<String> {
        let cost = snapshot.cost.get();
        let items = self
            .host_estimates(snapshot)
            .into_iter()
            .enumerate()
            .map(|(host, estimate)| match estimate {
                Some(e) => format!("{}={:.2}/{}", host, e, cost.get(host)),
                None => format!("{}=-/{}", host, cost.get(host)),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("estimate/cost: [{}]", items))
    }
}
