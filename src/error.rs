//! Error types for configuration, the record store and replica selection.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating [`SelectorConfig`](crate::config::SelectorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid TOML or has the wrong shape.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration parsed but is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write found the key at a different version than it was read at.
    #[error("concurrent update on key '{key}'")]
    Conflict { key: String },

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value did not decode into the expected shape.
    #[error("malformed value under key '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether re-running the whole decision with fresh reads may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while choosing a replica.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// Projected load falls outside the performance curve.
    #[error("load {load} is outside the performance curve (max {max})")]
    OutOfRange { load: f64, max: f64 },

    /// Resource-constrained policy has no selected or selectable region.
    #[error("no candidate region available")]
    NoCandidateRegion,

    /// A policy chose an index outside the host table.
    #[error("host {host} is outside the host table ({hosts} hosts)")]
    UnknownHost { host: usize, hosts: usize },

    /// Every attempt to commit a decision failed.
    #[error("selection failed after {attempts} attempts: {last}")]
    SelectionFailed {
        attempts: usize,
        #[source]
        last: StoreError,
    },

    /// Non-retryable store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for selection operations.
pub type SelectionResult<T> = Result<T, SelectionError>;
