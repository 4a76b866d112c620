//! Background sweep removing listings past `ttl + grace`.
//!
//! Each pass is one bulk delete against the store, so it needs no
//! coordination with request handlers renewing the same rows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use catalog_core::CatalogRegistry;

use crate::periodic::{spawn_periodic, PeriodicJob};

pub struct Reaper {
    registry: Arc<CatalogRegistry>,
}

impl Reaper {
    pub fn new(registry: Arc<CatalogRegistry>) -> Self {
        Self { registry }
    }

    /// One sweep. Returns rows removed; store failures count as zero.
    pub fn sweep(&self) -> usize {
        match self.registry.reap() {
            Ok(0) => {
                tracing::debug!("reaper: nothing stale");
                0
            }
            Ok(removed) => {
                tracing::info!(removed, "reaper purged stale listings");
                removed
            }
            Err(err) => {
                tracing::error!(error = %err, "reaper sweep failed");
                0
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for Reaper {
    fn name(&self) -> &'static str {
        "reaper"
    }

    async fn run_once(&mut self) {
        let reaper = Reaper::new(self.registry.clone());
        // The store may block on disk I/O; keep it off the async workers.
        if let Err(err) = tokio::task::spawn_blocking(move || reaper.sweep()).await {
            tracing::error!(error = %err, "reaper task join failure");
        }
    }
}

/// Start the reaper; it stops when `cancel` fires.
pub fn spawn_reaper(
    registry: Arc<CatalogRegistry>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<Reaper> {
    spawn_periodic(Reaper::new(registry), period, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{LivenessPolicy, ManualClock, MemoryStore, PeerId};
    use chrono::Utc;

    fn registry_with_clock() -> (Arc<CatalogRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = CatalogRegistry::with_clock(
            Arc::new(MemoryStore::new()),
            LivenessPolicy::new(Duration::from_secs(60), Duration::from_secs(60)),
            clock.clone(),
        );
        (Arc::new(registry), clock)
    }

    #[test]
    fn sweep_counts_removed_rows() {
        let (registry, clock) = registry_with_clock();
        let peer = PeerId::from("peer");
        registry.list(&peer, "a", "127.0.0.1", 1).expect("list");
        registry.list(&peer, "b", "127.0.0.1", 1).expect("list");

        let reaper = Reaper::new(registry.clone());
        assert_eq!(reaper.sweep(), 0);

        clock.advance(Duration::from_secs(121));
        assert_eq!(reaper.sweep(), 2);
        assert_eq!(registry.entry_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn spawned_reaper_sweeps_immediately_and_stops_on_cancel() {
        let (registry, clock) = registry_with_clock();
        registry
            .list(&PeerId::from("peer"), "old", "127.0.0.1", 1)
            .expect("list");
        clock.advance(Duration::from_secs(500));

        let cancel = CancellationToken::new();
        let handle = spawn_reaper(registry.clone(), Duration::from_secs(3_600), cancel.clone());

        for _ in 0..100 {
            if registry.entry_count().expect("count") == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.entry_count().expect("count"), 0);

        cancel.cancel();
        handle.await.expect("join");
    }
}
