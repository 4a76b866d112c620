use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the registry server runtime and its wire protocol.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] catalog_core::StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] catalog_core::CatalogError),

    #[error("config error: {0}")]
    Config(#[from] catalog_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry protocol error: {0}")]
    Protocol(String),

    #[error("registry is not reachable at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("registry at {addr} did not answer within {timeout_ms} ms")]
    Timeout { addr: String, timeout_ms: u128 },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        path: path.into(),
        source,
    }
}
