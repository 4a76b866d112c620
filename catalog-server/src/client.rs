//! [`CatalogApi`] over the registry's TCP protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use catalog_core::{CatalogApi, CatalogError, EntryId, OwnerLocation, PeerId, SearchHit};

use crate::protocol::{send_request, CatalogRequest, ErrorCode};

/// Client half of the registry protocol. Each call opens one short-lived
/// connection bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    addr: String,
    timeout: Duration,
}

impl RemoteCatalog {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Raw `status` payload from the server.
    pub async fn status(&self) -> Result<Value, CatalogError> {
        self.call(CatalogRequest::Status).await
    }

    async fn call(&self, request: CatalogRequest) -> Result<Value, CatalogError> {
        let response = send_request(&self.addr, &request, self.timeout)
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        if response.ok {
            return Ok(response.data.unwrap_or(Value::Null));
        }
        let message = response
            .error
            .unwrap_or_else(|| "unknown registry error".to_string());
        Err(match (response.code, request) {
            (Some(ErrorCode::InvalidFileName), CatalogRequest::List { file_name, .. }) => {
                CatalogError::InvalidFileName(file_name)
            }
            _ => CatalogError::Unavailable(message),
        })
    }

    async fn call_field<T: DeserializeOwned>(
        &self,
        request: CatalogRequest,
        field: &str,
    ) -> Result<T, CatalogError> {
        let mut data = self.call(request).await?;
        let value = data.get_mut(field).map(Value::take).unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|err| {
            CatalogError::Unavailable(format!("malformed '{field}' in registry response: {err}"))
        })
    }
}

#[async_trait]
impl CatalogApi for RemoteCatalog {
    async fn list(
        &self,
        peer_id: &PeerId,
        file_name: &str,
        address: &str,
        port: u16,
    ) -> Result<(), CatalogError> {
        self.call(CatalogRequest::List {
            peer_id: peer_id.clone(),
            file_name: file_name.to_string(),
            address: address.to_string(),
            port,
        })
        .await
        .map(|_| ())
    }

    async fn delist(&self, file_name: &str, peer_id: &PeerId) -> Result<bool, CatalogError> {
        self.call_field(
            CatalogRequest::Delist {
                file_name: file_name.to_string(),
                peer_id: peer_id.clone(),
            },
            "removed",
        )
        .await
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
        self.call_field(
            CatalogRequest::Search {
                query: query.to_string(),
            },
            "hits",
        )
        .await
    }

    async fn resolve_owner(&self, id: EntryId) -> Result<Option<OwnerLocation>, CatalogError> {
        self.call_field(CatalogRequest::ResolveOwner { id }, "owner")
            .await
    }

    async fn heartbeat(&self, peer_id: &PeerId) -> Result<bool, CatalogError> {
        self.call_field(
            CatalogRequest::Heartbeat {
                peer_id: peer_id.clone(),
            },
            "renewed",
        )
        .await
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), CatalogError> {
        self.call(CatalogRequest::Disconnect {
            peer_id: peer_id.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn liveness_window(&self) -> Result<Duration, CatalogError> {
        let millis: u64 = self
            .call_field(CatalogRequest::LivenessWindow, "ttl_ms")
            .await?;
        Ok(Duration::from_millis(millis))
    }
}
