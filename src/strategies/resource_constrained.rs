//! Resource-constrained replica selection.
//!
//! A record may keep at most `resource_threshold` regions active. While the
//! quota has room, the best-baseline region not yet selected is admitted if
//! it beats every selected region's estimate; otherwise, and always once the
//! quota is full, the selected region with the lowest estimate serves the
//! request from its first host. There is no random fallback.

use std::sync::Arc;

use tracing::{debug, info, trace};

use super::strategy::{assign, first_host, release_previous, ReplicaSelectionPolicy};
use crate::config::SelectorConfig;
use crate::error::{SelectionError, SelectionResult};
use crate::estimator::PerformanceEstimator;
use crate::store::{CounterSnapshot, SelectedRegionSet};

pub struct ResourceConstrainedStrategy {
    config: Arc<SelectorConfig>,
    estimator: PerformanceEstimator,
    /// Regions ordered by baseline latency, lowest first.
    baseline_order: Vec<usize>,
}

impl ResourceConstrainedStrategy {
    pub fn new(config: Arc<SelectorConfig>) -> Self {
        let estimator = PerformanceEstimator::from_config(&config);
        let mut baseline_order: Vec<usize> = (0..config.region_count()).collect();
        baseline_order.sort_by(|&a, &b| {
            config.region_baselines[a]
                .partial_cmp(&config.region_baselines[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self {
            config,
            estimator,
            baseline_order,
        }
    }

    /// Estimated latency per region at its first host's load plus one unit.
    /// Regions beyond the curve, or whose projected load overflows, estimate
    /// as infinity.
    fn region_estimates(&self, snapshot: &CounterSnapshot) -> Vec<f64> {
        let load = snapshot.load.get();
        let latencies = &snapshot.field.get().latencies;
        (0..self.config.region_count())
            .map(|region| {
                let Some(projected) =
                    load.get(first_host(region)).checked_add(self.config.load_unit)
                else {
                    debug!(region, "projected load overflows");
                    return f64::INFINITY;
                };
                self.estimator
                    .estimate(region, projected, latencies)
                    .unwrap_or_else(|e| {
                        debug!(region, error = %e, "region estimate out of range");
                        f64::INFINITY
                    })
            })
            .collect()
    }

    /// Selected region with the lowest estimate, earliest admitted on ties.
    fn cheapest_selected(selected: &SelectedRegionSet, estimates: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for region in selected.iter() {
            let Some(&estimate) = estimates.get(region) else {
                continue;
            };
            match best {
                Some((_, b)) if b <= estimate => {}
                _ => best = Some((region, estimate)),
            }
        }
        best.map(|(region, _)| region)
    }

    fn next_unselected(&self, selected: &SelectedRegionSet) -> Option<usize> {
        self.baseline_order
            .iter()
            .copied()
            .find(|&region| !selected.contains(region))
    }
}

impl ReplicaSelectionPolicy for ResourceConstrainedStrategy {
    fn select(&self, snapshot: &mut CounterSnapshot) -> SelectionResult<usize> {
        let unit = self.config.load_unit;
        let quota = self.config.resource_threshold;
        release_previous(snapshot, self.config.hosts.len(), unit);

        let estimates = self.region_estimates(snapshot);
        let selected = snapshot.selected.get();

        let admit = if selected.len() >= quota {
            None
        } else {
            self.next_unselected(selected).filter(|&candidate| {
                let estimate = estimates[candidate];
                selected
                    .iter()
                    .all(|region| estimates.get(region).map_or(true, |&e| estimate < e))
            })
        };

        let region = match admit {
            Some(region) => {
                snapshot.selected.get_mut().admit(region, quota);
                info!(
                    field = snapshot.field_name(),
                    region,
                    selected = snapshot.selected.get().len(),
                    "region admitted"
                );
                region
            }
            None => Self::cheapest_selected(selected, &estimates)
                .ok_or(SelectionError::NoCandidateRegion)?,
        };

        let host = first_host(region);
        trace!(field = snapshot.field_name(), region, host, "resource-constrained decision");
        assign(snapshot, host, unit);
        Ok(host)
    }

    fn name(&self) -> &'static str {
        "resource-constrained"
    }

    fn debug_snapshot(&self, snapshot: &CounterSnapshot) -> Option<String> {
        let selected = snapshot.selected.get();
        let items = self
            .region_estimates(snapshot)
            .into_iter()
            .enumerate()
            .map(|(region, estimate)| {
                let mark = if selected.contains(region) { "*" } else { "" };
                format!("{}{}={:.2}", region, mark, estimate)
            })
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("region estimates: [{}]", items))
    }
}
