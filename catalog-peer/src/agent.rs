//! Peer agent: keeps the registry in step with the share directory.
//!
//! A reconciliation cycle registers new files, withdraws removed ones and
//! then heartbeats. A `false` heartbeat while the agent believes it has
//! listings means the registry lost them (reaped, restarted, wiped); the
//! agent forgets what it registered and runs the cycle again at once, at most
//! [`MAX_IMMEDIATE_RESYNCS`] times per tick.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use catalog_core::types::is_valid_file_name;
use catalog_core::{CatalogApi, CatalogError, PeerId};
use catalog_server::PeriodicJob;

/// Immediate re-registrations allowed within one tick.
pub const MAX_IMMEDIATE_RESYNCS: usize = 3;

/// `max(floor, 3/4 of ttl)`.
pub fn heartbeat_period(ttl: Duration, floor: Duration) -> Duration {
    (ttl / 4 * 3).max(floor)
}

/// Outcome of one tick, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub delisted: usize,
    /// Registry calls that failed and will be retried next tick.
    pub failures: usize,
    /// Immediate re-runs triggered by a lost-state heartbeat.
    pub resyncs: usize,
    /// Last heartbeat answer; `None` when no heartbeat completed.
    pub renewed: Option<bool>,
    /// Share directory was empty, so the registry was not contacted.
    pub idle: bool,
}

pub struct PeerAgent {
    catalog: Arc<dyn CatalogApi>,
    peer_id: PeerId,
    share_dir: PathBuf,
    address: String,
    port: u16,
    known: BTreeSet<String>,
    disconnected: bool,
}

impl PeerAgent {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        peer_id: PeerId,
        share_dir: impl Into<PathBuf>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            catalog,
            peer_id,
            share_dir: share_dir.into(),
            address: address.into(),
            port,
            known: BTreeSet::new(),
            disconnected: false,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Names the agent believes are registered.
    pub fn known(&self) -> &BTreeSet<String> {
        &self.known
    }

    /// One reconciliation tick. Never fails; problems are logged and retried
    /// on the next tick.
    pub async fn reconcile(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        loop {
            let on_disk = match scan_share_dir(&self.share_dir).await {
                Ok(names) => names,
                Err(err) => {
                    tracing::warn!(
                        dir = %self.share_dir.display(),
                        error = %err,
                        "cannot scan share directory"
                    );
                    report.failures += 1;
                    return report;
                }
            };
            if on_disk.is_empty() {
                report.idle = true;
                return report;
            }

            self.register_new(&on_disk, &mut report).await;
            self.withdraw_removed(&on_disk, &mut report).await;

            match self.catalog.heartbeat(&self.peer_id).await {
                Ok(true) => {
                    report.renewed = Some(true);
                    return report;
                }
                Ok(false) if !self.known.is_empty() => {
                    report.renewed = Some(false);
                    if report.resyncs >= MAX_IMMEDIATE_RESYNCS {
                        tracing::warn!(
                            resyncs = report.resyncs,
                            "registry keeps losing our listings; waiting for next tick"
                        );
                        return report;
                    }
                    tracing::warn!(
                        forgotten = self.known.len(),
                        "registry lost our listings; re-registering"
                    );
                    self.known.clear();
                    report.resyncs += 1;
                }
                Ok(false) => {
                    report.renewed = Some(false);
                    return report;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "heartbeat failed");
                    report.failures += 1;
                    return report;
                }
            }
        }
    }

    async fn register_new(&mut self, on_disk: &BTreeSet<String>, report: &mut CycleReport) {
        let fresh: Vec<String> = on_disk.difference(&self.known).cloned().collect();
        for name in fresh {
            match self
                .catalog
                .list(&self.peer_id, &name, &self.address, self.port)
                .await
            {
                Ok(()) => {
                    tracing::info!(file_name = %name, "registered");
                    self.known.insert(name);
                    report.listed += 1;
                }
                Err(err) => {
                    tracing::warn!(file_name = %name, error = %err, "list failed");
                    report.failures += 1;
                }
            }
        }
    }

    async fn withdraw_removed(&mut self, on_disk: &BTreeSet<String>, report: &mut CycleReport) {
        let gone: Vec<String> = self.known.difference(on_disk).cloned().collect();
        for name in gone {
            match self.catalog.delist(&name, &self.peer_id).await {
                Ok(removed) => {
                    if !removed {
                        tracing::debug!(file_name = %name, "listing already gone");
                    }
                    tracing::info!(file_name = %name, "withdrawn");
                    self.known.remove(&name);
                    report.delisted += 1;
                }
                Err(err) => {
                    tracing::warn!(file_name = %name, error = %err, "delist failed");
                    report.failures += 1;
                }
            }
        }
    }

    /// Withdraw every listing of this peer. Only the first call contacts the
    /// registry.
    pub async fn shutdown(&mut self) -> Result<(), CatalogError> {
        if self.disconnected {
            return Ok(());
        }
        self.disconnected = true;
        self.known.clear();
        self.catalog.disconnect(&self.peer_id).await?;
        tracing::info!(peer = self.peer_id.short(), "disconnected from registry");
        Ok(())
    }
}

#[async_trait]
impl PeriodicJob for PeerAgent {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    async fn run_once(&mut self) {
        let report = self.reconcile().await;
        if report.listed + report.delisted + report.resyncs + report.failures > 0 {
            tracing::info!(
                listed = report.listed,
                delisted = report.delisted,
                resyncs = report.resyncs,
                failures = report.failures,
                "reconciliation cycle"
            );
        } else {
            tracing::debug!(idle = report.idle, "reconciliation cycle: no changes");
        }
    }
}

/// Regular, non-hidden files directly under `dir` whose names can be listed.
pub async fn scan_share_dir(dir: &Path) -> std::io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 file name");
            continue;
        };
        if name.starts_with('.') || !is_valid_file_name(&name) {
            continue;
        }
        // Follows symlinks: a link to a regular file is shared.
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_file() => {
                names.insert(name);
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(file_name = %name, error = %err, "skipping unreadable entry"),
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn heartbeat_period_is_three_quarters_of_ttl_with_floor() {
        assert_eq!(
            heartbeat_period(Duration::from_secs(120), Duration::from_secs(10)),
            Duration::from_secs(90)
        );
        assert_eq!(
            heartbeat_period(Duration::from_secs(8), Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn scan_skips_hidden_files_and_directories() {
        let dir = TempDir::new().expect("dir");
        fs::write(dir.path().join("song.mp3"), b"x").expect("write");
        fs::write(dir.path().join(".DS_Store"), b"x").expect("write");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested").join("inner.txt"), b"x").expect("write");

        let names = scan_share_dir(dir.path()).await.expect("scan");
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["song.mp3"]);
    }

    #[tokio::test]
    async fn scan_of_missing_directory_fails() {
        let dir = TempDir::new().expect("dir");
        assert!(scan_share_dir(&dir.path().join("absent")).await.is_err());
    }
}
