//! Piecewise-linear latency estimate for a host at a projected load.

use crate::config::SelectorConfig;
use crate::error::{SelectionError, SelectionResult};

/// Maps projected load to processing delay, then adds the region's latency.
#[derive(Debug, Clone)]
pub struct PerformanceEstimator {
    curve: Vec<f64>,
    interval: f64,
}

impl PerformanceEstimator {
    /// Build an estimator from explicit breakpoints.
    #[must_use]
    pub fn new(curve: Vec<f64>, interval: f64) -> Self {
        Self { curve, interval }
    }

    /// Build an estimator from a validated configuration.
    #[must_use]
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self::new(config.performance_curve.clone(), config.interval)
    }

    /// Highest load the curve covers.
    #[must_use]
    pub fn max_load(&self) -> f64 {
        self.curve.len().saturating_sub(1) as f64 * self.interval
    }

    /// Processing delay at `load`, interpolated between breakpoints.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::OutOfRange`] if `load` is negative or lies
    /// beyond the last breakpoint.
    pub fn delay(&self, load: f64) -> SelectionResult<f64> {
        let position = load / self.interval;
        if position.is_nan() || position < 0.0 {
            return Err(self.out_of_range(load));
        }
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let (Some(&low), Some(&high)) = (self.curve.get(lower), self.curve.get(upper)) else {
            return Err(self.out_of_range(load));
        };
        Ok(low + (position - lower as f64) * (high - low))
    }

    /// Estimated latency for serving from `region` at `candidate_load`.
    ///
    /// `latencies` is the field's per-region latency vector; a region with no
    /// entry contributes no offset.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::OutOfRange`] as for [`delay`](Self::delay).
    pub fn estimate(
        &self,
        region: usize,
        candidate_load: i64,
        latencies: &[f64],
    ) -> SelectionResult<f64> {
        let delay = self.delay(candidate_load as f64)?;
        Ok(delay + latencies.get(region).copied().unwrap_or(0.0))
    }

    fn out_of_range(&self, load: f64) -> SelectionError {
        SelectionError::OutOfRange {
            load,
            max: self.max_load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> PerformanceEstimator {
        PerformanceEstimator::new(vec![0.0, 1.0, 1.0, 2.0, 5.0, 24.0, 10000.0], 250.0)
    }

    #[test]
    fn test_delay_on_breakpoints() {
        let e = estimator();
        assert_eq!(e.delay(0.0).unwrap(), 0.0);
        assert_eq!(e.delay(250.0).unwrap(), 1.0);
        assert_eq!(e.delay(1000.0).unwrap(), 5.0);
        assert_eq!(e.delay(1500.0).unwrap(), 10000.0);
    }

    #[test]
    fn test_delay_interpolates() {
        let e = estimator();
        assert!((e.delay(10.0).unwrap() - 0.04).abs() < 1e-9);
        assert!((e.delay(875.0).unwrap() - 3.5).abs() < 1e-9);
        assert!((e.delay(1125.0).unwrap() - 14.5).abs() < 1e-9);
    }

    #[test]
    fn test_delay_out_of_range() {
        let e = estimator();
        assert!(matches!(
            e.delay(1510.0),
            Err(SelectionError::OutOfRange { max, .. }) if max == 1500.0
        ));
        assert!(e.delay(-10.0).is_err());
        assert!(e.delay(f64::NAN).is_err());
    }

    #[test]
    fn test_estimate_adds_region_latency() {
        let e = estimator();
        let latencies = [10.0, 50.0];
        assert!((e.estimate(0, 10, &latencies).unwrap() - 10.04).abs() < 1e-9);
        assert!((e.estimate(1, 10, &latencies).unwrap() - 50.04).abs() < 1e-9);
        assert!((e.estimate(5, 10, &latencies).unwrap() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_from_config() {
        let e = PerformanceEstimator::from_config(&SelectorConfig::default());
        assert_eq!(e.max_load(), 1500.0);
    }
}
