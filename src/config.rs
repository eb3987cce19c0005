//! Selector configuration.
//!
//! Loaded once at startup and immutable afterwards. Hosts are paired two per
//! region, so `hosts.len()` must equal `2 * region_baselines.len()`.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which replica selection policy the hook dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Admit hosts under the latency threshold, prefer the highest accrued cost.
    #[default]
    CostAware,
    /// Bound the number of active regions per record.
    ResourceConstrained,
}

/// Configuration for replica selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Host identifiers; host `i` belongs to region `i / 2`.
    pub hosts: Vec<String>,

    /// Baseline latency per region.
    pub region_baselines: Vec<f64>,

    /// Processing delay at each load breakpoint.
    pub performance_curve: Vec<f64>,

    /// Load width between two breakpoints.
    pub interval: f64,

    /// Highest load the curve must cover.
    pub max_load: f64,

    /// Hosts estimated below this latency are admissible.
    pub performance_threshold: f64,

    /// Projected load cap for the best-region fallback.
    pub replica_threshold: i64,

    /// Maximum number of selected regions.
    pub resource_threshold: usize,

    /// Load added per served request.
    pub load_unit: i64,

    /// Cost added per served request, in load units.
    pub cost_multiplier: i64,

    /// Position of the assigned-host entry in a field's latency vector.
    pub assigned_slot: usize,

    /// Attempts before a selection is reported as failed.
    pub max_retries: usize,

    /// Active policy.
    pub policy: PolicyKind,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "replica-1:8080".to_string(),
                "replica-2:8080".to_string(),
                "replica-3:8080".to_string(),
                "replica-4:8080".to_string(),
            ],
            region_baselines: vec![10.0, 50.0],
            performance_curve: vec![0.0, 1.0, 1.0, 2.0, 5.0, 24.0, 10000.0],
            interval: 250.0,
            max_load: 1500.0,
            performance_threshold: 150.0,
            replica_threshold: 1000,
            resource_threshold: 1,
            load_unit: 10,
            cost_multiplier: 1,
            assigned_slot: 4,
            max_retries: 8,
            policy: PolicyKind::default(),
        }
    }
}

impl SelectorConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, the TOML is
    /// malformed, or validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Number of regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.region_baselines.len()
    }

    /// Breakpoints needed to cover `max_load`.
    #[must_use]
    pub fn required_breakpoints(&self) -> usize {
        (self.max_load / self.interval).ceil() as usize + 1
    }

    /// COST added to the chosen host per served request.
    #[must_use]
    pub fn cost_increment(&self) -> i64 {
        self.load_unit.saturating_mul(self.cost_multiplier)
    }

    /// Check the configuration before any selection runs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.hosts.is_empty() {
            return Err(invalid("host table is empty"));
        }
        if self.hosts.len() != 2 * self.region_count() {
            return Err(invalid(format!(
                "{} hosts do not pair up with {} regions",
                self.hosts.len(),
                self.region_count()
            )));
        }
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(invalid("interval must be positive"));
        }
        if !(self.max_load.is_finite() && self.max_load >= 0.0) {
            return Err(invalid("max_load must be non-negative"));
        }
        if self.load_unit <= 0 {
            return Err(invalid("load_unit must be positive"));
        }
        if self.cost_multiplier < 0 {
            return Err(invalid("cost_multiplier must not be negative"));
        }
        if self.load_unit.checked_mul(self.cost_multiplier).is_none() {
            return Err(invalid("load_unit * cost_multiplier overflows"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries must be at least 1"));
        }
        if self.region_baselines.iter().any(|b| !b.is_finite()) {
            return Err(invalid("region baselines must be finite"));
        }
        if self.performance_curve.iter().any(|p| !p.is_finite()) {
            return Err(invalid("performance curve breakpoints must be finite"));
        }
        let required = self.required_breakpoints();
        if self.performance_curve.len() < required {
            return Err(invalid(format!(
                "performance curve has {} breakpoints, {} needed to cover load {}",
                self.performance_curve.len(),
                required,
                self.max_load
            )));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SelectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.region_count(), 2);
        assert_eq!(config.required_breakpoints(), 7);
        assert_eq!(config.policy, PolicyKind::CostAware);
    }

    #[test]
    fn test_short_curve_rejected() {
        let config = SelectorConfig {
            performance_curve: vec![0.0, 1.0, 1.0, 2.0, 5.0, 24.0],
            ..SelectorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("6 breakpoints, 7 needed"), "{err}");
    }

    #[test]
    fn test_unpaired_hosts_rejected() {
        let mut config = SelectorConfig::default();
        config.hosts.pop();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_hosts_rejected() {
        let config = SelectorConfig {
            hosts: vec![],
            region_baselines: vec![],
            ..SelectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SelectorConfig {
            interval: 0.0,
            ..SelectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overflowing_cost_increment_rejected() {
        let config = SelectorConfig {
            load_unit: i64::MAX / 2,
            cost_multiplier: 3,
            ..SelectorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");

        let config = SelectorConfig {
            cost_multiplier: 4,
            ..SelectorConfig::default()
        };
        assert_eq!(config.cost_increment(), 40);
    }

    #[test]
    fn test_deserialize_config() {
        let toml = r#"
            hosts = ["a:1", "b:1", "c:1", "d:1", "e:1", "f:1"]
            region_baselines = [30.0, 10.0, 20.0]
            performance_curve = [0, 1, 2, 4, 8]
            interval = 100.0
            max_load = 400.0
            resource_threshold = 2
            policy = "resource-constrained"
        "#;

        let config = SelectorConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.hosts.len(), 6);
        assert_eq!(config.region_count(), 3);
        assert_eq!(config.resource_threshold, 2);
        assert_eq!(config.policy, PolicyKind::ResourceConstrained);
        assert_eq!(config.load_unit, 10);
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        let toml = r#"
            performance_curve = [0, 1]
        "#;
        assert!(matches!(
            SelectorConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            SelectorConfig::from_toml_str("hosts = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = SelectorConfig::from_file("/nonexistent/selector.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
