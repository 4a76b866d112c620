//! Registry wire protocol: one JSON object per line over TCP.
//!
//! ```text
//! → {"cmd":"heartbeat","peer_id":"…"}
//! ← {"ok":true,"data":{"renewed":true}}
//! ```
//!
//! A connection may carry any number of request lines; each gets exactly one
//! response line, in order.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use catalog_core::{CatalogError, EntryId, PeerId};

use crate::error::ServerError;

/// JSON newline-delimited request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum CatalogRequest {
    List {
        peer_id: PeerId,
        file_name: String,
        address: String,
        port: u16,
    },
    Delist {
        file_name: String,
        peer_id: PeerId,
    },
    Search {
        query: String,
    },
    ResolveOwner {
        id: EntryId,
    },
    Heartbeat {
        peer_id: PeerId,
    },
    Disconnect {
        peer_id: PeerId,
    },
    LivenessWindow,
    Status,
}

impl CatalogRequest {
    /// Command name for logs; never includes the peer identity.
    pub fn name(&self) -> &'static str {
        match self {
            CatalogRequest::List { .. } => "list",
            CatalogRequest::Delist { .. } => "delist",
            CatalogRequest::Search { .. } => "search",
            CatalogRequest::ResolveOwner { .. } => "resolve_owner",
            CatalogRequest::Heartbeat { .. } => "heartbeat",
            CatalogRequest::Disconnect { .. } => "disconnect",
            CatalogRequest::LivenessWindow => "liveness_window",
            CatalogRequest::Status => "status",
        }
    }
}

/// Machine-readable failure class carried next to the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Store or server trouble; retry later.
    Unavailable,
    InvalidFileName,
    BadRequest,
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl CatalogResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }

    pub fn from_catalog_error(err: &CatalogError) -> Self {
        let code = match err {
            CatalogError::InvalidFileName(_) => ErrorCode::InvalidFileName,
            _ => ErrorCode::Unavailable,
        };
        Self::error(code, err.to_string())
    }
}

/// Send one request to the registry at `addr` and return one response.
///
/// The whole exchange, connect included, is bounded by `timeout`.
pub async fn send_request(
    addr: &str,
    request: &CatalogRequest,
    timeout: Duration,
) -> Result<CatalogResponse, ServerError> {
    match tokio::time::timeout(timeout, exchange(addr, request)).await {
        Ok(result) => result,
        Err(_) => Err(ServerError::Timeout {
            addr: addr.to_string(),
            timeout_ms: timeout.as_millis(),
        }),
    }
}

async fn exchange(addr: &str, request: &CatalogRequest) -> Result<CatalogResponse, ServerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|err| ServerError::Unreachable {
            addr: addr.to_string(),
            reason: err.to_string(),
        })?;
    let (reader, mut writer) = stream.into_split();

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| crate::error::io_err(addr, e))?;
    writer
        .flush()
        .await
        .map_err(|e| crate::error::io_err(addr, e))?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| crate::error::io_err(addr, e))?;
    if read == 0 {
        return Err(ServerError::Protocol(
            "registry closed connection before responding".to_string(),
        ));
    }

    let response: CatalogResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}
