//! Transport-agnostic registry surface.
//!
//! Peers program against [`CatalogApi`]; the in-process [`CatalogRegistry`]
//! implements it directly and remote clients implement it over a wire.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CatalogError;
use crate::registry::CatalogRegistry;
use crate::types::{EntryId, OwnerLocation, PeerId, SearchHit};

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list(
        &self,
        peer_id: &PeerId,
        file_name: &str,
        address: &str,
        port: u16,
    ) -> Result<(), CatalogError>;

    /// `Ok(false)` when nothing owned by `peer_id` matched.
    async fn delist(&self, file_name: &str, peer_id: &PeerId) -> Result<bool, CatalogError>;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError>;

    async fn resolve_owner(&self, id: EntryId) -> Result<Option<OwnerLocation>, CatalogError>;

    /// `Ok(false)` when the registry holds no live listing for `peer_id`.
    async fn heartbeat(&self, peer_id: &PeerId) -> Result<bool, CatalogError>;

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), CatalogError>;

    async fn liveness_window(&self) -> Result<Duration, CatalogError>;
}

#[async_trait]
impl CatalogApi for CatalogRegistry {
    async fn list(
        &self,
        peer_id: &PeerId,
        file_name: &str,
        address: &str,
        port: u16,
    ) -> Result<(), CatalogError> {
        CatalogRegistry::list(self, peer_id, file_name, address, port).map(|_| ())
    }

    async fn delist(&self, file_name: &str, peer_id: &PeerId) -> Result<bool, CatalogError> {
        CatalogRegistry::delist(self, file_name, peer_id)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
        CatalogRegistry::search(self, query)
    }

    async fn resolve_owner(&self, id: EntryId) -> Result<Option<OwnerLocation>, CatalogError> {
        CatalogRegistry::resolve_owner(self, id)
    }

    async fn heartbeat(&self, peer_id: &PeerId) -> Result<bool, CatalogError> {
        CatalogRegistry::heartbeat(self, peer_id)
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), CatalogError> {
        CatalogRegistry::disconnect(self, peer_id).map(|_| ())
    }

    async fn liveness_window(&self) -> Result<Duration, CatalogError> {
        Ok(CatalogRegistry::liveness_window(self))
    }
}
