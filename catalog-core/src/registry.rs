//! Catalog registry: the registration API over a [`RegistryStore`].
//!
//! Every operation maps to exactly one store statement, so the registry holds
//! no locks of its own and is safe to share between request handlers and the
//! reaper.
//!
//! Liveness has two boundaries:
//! - reads (`search`, `resolve_owner`) only see rows with
//!   `now - last_seen <= ttl`;
//! - the reaper only deletes rows with `last_seen < now - (ttl + grace)`, so a
//!   renewal racing a sweep still wins.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::CatalogError;
use crate::store::RegistryStore;
use crate::types::{
    cutoff, is_valid_file_name, EntryId, FileEntry, NewListing, OwnerLocation, PeerId, SearchHit,
};

/// TTL and the reaper's extra grace margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    pub ttl: Duration,
    pub grace: Duration,
}

impl LivenessPolicy {
    pub fn new(ttl: Duration, grace: Duration) -> Self {
        Self { ttl, grace }
    }

    /// Age past which the reaper deletes a row.
    pub fn reap_after(&self) -> Duration {
        self.ttl.saturating_add(self.grace)
    }
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            grace: Duration::from_secs(60),
        }
    }
}

pub struct CatalogRegistry {
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
    policy: LivenessPolicy,
}

impl CatalogRegistry {
    pub fn new(store: Arc<dyn RegistryStore>, policy: LivenessPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RegistryStore>,
        policy: LivenessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    /// Register `file_name` at `address:port` for `peer_id`, or refresh it.
    pub fn list(
        &self,
        peer_id: &PeerId,
        file_name: &str,
        address: &str,
        port: u16,
    ) -> Result<FileEntry, CatalogError> {
        if !is_valid_file_name(file_name) {
            tracing::warn!(peer = peer_id.short(), file_name, "rejected listing with invalid name");
            return Err(CatalogError::InvalidFileName(file_name.to_string()));
        }

        let listing = NewListing {
            owner: peer_id.clone(),
            file_name: file_name.to_string(),
            address: address.to_string(),
            port,
        };
        let entry = self
            .store
            .upsert(&listing, self.clock.now())
            .map_err(|err| {
                tracing::error!(error = %err, file_name, "store failure in list");
                CatalogError::from(err)
            })?;

        tracing::info!(
            id = %entry.id,
            file_name,
            address,
            port,
            "listing updated",
        );
        Ok(entry)
    }

    /// Remove `file_name` if and only if `peer_id` owns it.
    ///
    /// Returns `false` when nothing matched: the caller either does not own
    /// the listing or it was already reaped. Neither is an error.
    pub fn delist(&self, file_name: &str, peer_id: &PeerId) -> Result<bool, CatalogError> {
        let removed = self.store.delete_owned(file_name, peer_id).map_err(|err| {
            tracing::error!(error = %err, file_name, "store failure in delist");
            CatalogError::from(err)
        })?;

        if removed == 0 {
            tracing::warn!(file_name, "unauthorized or stale delist attempt");
            Ok(false)
        } else {
            tracing::info!(file_name, "listing removed");
            Ok(true)
        }
    }

    /// Case-insensitive substring search over live listings.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
        let seen_since = cutoff(self.clock.now(), self.policy.ttl);
        self.store.search(query, seen_since).map_err(|err| {
            tracing::error!(error = %err, query, "store failure in search");
            CatalogError::from(err)
        })
    }

    /// Look up a live listing by the id returned from [`search`](Self::search).
    pub fn resolve_owner(&self, id: EntryId) -> Result<Option<OwnerLocation>, CatalogError> {
        let now = self.clock.now();
        let entry = self.store.get(id).map_err(|err| {
            tracing::error!(error = %err, id = %id, "store failure in resolve_owner");
            CatalogError::from(err)
        })?;
        Ok(entry
            .filter(|e| e.is_alive(now, self.policy.ttl))
            .map(|e| e.location()))
    }

    /// Renew every listing owned by `peer_id`.
    ///
    /// `false` means the registry holds nothing live for this identity; the
    /// peer should treat its registrations as lost.
    pub fn heartbeat(&self, peer_id: &PeerId) -> Result<bool, CatalogError> {
        let touched = self
            .store
            .touch_owner(peer_id, self.clock.now())
            .map_err(|err| {
                tracing::error!(error = %err, "store failure in heartbeat");
                CatalogError::from(err)
            })?;

        if touched == 0 {
            tracing::warn!(peer = peer_id.short(), "heartbeat matched no listings");
            Ok(false)
        } else {
            tracing::debug!(peer = peer_id.short(), renewed = touched, "heartbeat");
            Ok(true)
        }
    }

    /// Drop every listing owned by `peer_id`. Returns the number removed.
    pub fn disconnect(&self, peer_id: &PeerId) -> Result<usize, CatalogError> {
        let removed = self.store.delete_owner(peer_id).map_err(|err| {
            tracing::error!(error = %err, "store failure in disconnect");
            CatalogError::from(err)
        })?;
        tracing::info!(peer = peer_id.short(), removed, "peer disconnected");
        Ok(removed)
    }

    pub fn liveness_window(&self) -> Duration {
        self.policy.ttl
    }

    /// One reaper sweep: delete rows older than `ttl + grace`.
    pub fn reap(&self) -> Result<usize, CatalogError> {
        let Some(deadline) = cutoff(self.clock.now(), self.policy.reap_after()) else {
            return Ok(0);
        };
        Ok(self.store.delete_seen_before(deadline)?)
    }

    /// Rows currently stored, live or not.
    pub fn entry_count(&self) -> Result<usize, CatalogError> {
        Ok(self.store.count()?)
    }
}
