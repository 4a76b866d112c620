use std::path::PathBuf;

use thiserror::Error;

use catalog_core::EntryId;

/// Failures of the peer-to-peer file transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot connect to peer at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("peer at {addr} did not accept within {timeout_ms} ms")]
    ConnectTimeout { addr: String, timeout_ms: u128 },

    #[error("peer at {addr} sent no header within {timeout_ms} ms")]
    ResponseTimeout { addr: String, timeout_ms: u128 },

    #[error("requester sent no file name within {timeout_ms} ms")]
    RequestTimeout { timeout_ms: u128 },

    /// The responder closed without a header: it does not offer the file.
    #[error("peer does not offer '{0}'")]
    NotOffered(String),

    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    #[error("file name is {0} bytes; the wire limit is 65535")]
    NameTooLong(usize),

    #[error("file name is not valid UTF-8")]
    NameEncoding(#[from] std::string::FromUtf8Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer stream error: {0}")]
    Stream(#[source] std::io::Error),
}

/// Error surface of the peer runtime.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] catalog_core::CatalogError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("no live listing with id {0}")]
    NotFound(EntryId),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PeerError {
    PeerError::Io {
        path: path.into(),
        source,
    }
}
