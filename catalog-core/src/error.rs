//! Error types for catalog-core.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the registry store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with the file involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (snapshot write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Snapshot exists but cannot be parsed.
    #[error("failed to parse store snapshot at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The backing store refused the operation (engine down, disk full, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Errors surfaced by catalog operations, local or remote.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    /// The registry could not be reached or answered with a failure.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    /// Transient failures are retried on the next scheduled attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Store(_) | CatalogError::Unavailable(_))
    }
}

/// Errors loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
