//! Error taxonomy for the benchmarking core.
//!
//! Only cache fingerprint mismatches are recovered locally (by regenerating
//! the synthetic corpus). Everything else surfaces to the caller unchanged.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by datasets, ground-truth generation and the runner.
#[derive(Error, Debug)]
pub enum Error {
    /// Runner configuration disagrees with the dataset it is pointed at.
    #[error("{field} mismatch: runner has {runner}, dataset has {dataset}")]
    ConfigMismatch {
        field: &'static str,
        runner: String,
        dataset: String,
    },

    /// Runner or dataset configuration is unusable on its own.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A cache file exists but cannot be used as-is.
    #[error("cache {} is invalid: {reason}", path.display())]
    CacheInvalid { path: PathBuf, reason: String },

    /// A cache file that was required does not exist.
    #[error("file {} not found", path.display())]
    NotFound { path: PathBuf },

    /// Metric text matched none of the accepted aliases.
    #[error("unknown metric type: {0}")]
    UnknownMetric(String),

    /// Every ground-truth backend in the chain was unavailable.
    #[error("no exact knn backend available (tried: {})", tried.join(", "))]
    NoBackendAvailable { tried: Vec<String> },

    /// The engine selector named an engine this build cannot create.
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),

    /// An index under test failed during one of its lifecycle calls.
    #[error("engine failure during {stage}: {source}")]
    Engine {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    /// Array data does not have the expected shape.
    #[error("shape error: {0}")]
    Shape(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn cache_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CacheInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn engine(stage: impl Into<String>, source: anyhow::Error) -> Self {
        Error::Engine {
            stage: stage.into(),
            source,
        }
    }

    /// Whether this error means "the cache cannot be reused" rather than a
    /// hard failure. Synthetic corpora regenerate on these.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Error::CacheInvalid { .. } | Error::NotFound { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
