//! Reconciliation behaviour against a real registry and a scripted one.

use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{
    CatalogApi, CatalogError, CatalogRegistry, EntryId, LivenessPolicy, MemoryStore,
    OwnerLocation, PeerId, RegistryStore, SearchHit,
};
use catalog_peer::{PeerAgent, MAX_IMMEDIATE_RESYNCS};
use rstest::rstest;
use tempfile::TempDir;

/// Registry stand-in with switchable failures and call counters.
#[derive(Default)]
struct ScriptedCatalog {
    listed: Mutex<Vec<String>>,
    delisted: Mutex<Vec<String>>,
    failing_names: Mutex<HashSet<String>>,
    failing_delists: Mutex<HashSet<String>>,
    heartbeat_renews: AtomicBool,
    down: AtomicBool,
    heartbeats: AtomicUsize,
    disconnects: AtomicUsize,
}

impl ScriptedCatalog {
    fn renewing() -> Arc<Self> {
        let catalog = Self::default();
        catalog.heartbeat_renews.store(true, Ordering::SeqCst);
        Arc::new(catalog)
    }

    fn forgetful() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.listed.lock().unwrap().len()
            + self.delisted.lock().unwrap().len()
            + self.heartbeats.load(Ordering::SeqCst)
            + self.disconnects.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<(), CatalogError> {
        if self.down.load(Ordering::SeqCst) {
            Err(CatalogError::Unavailable("registry down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogApi for ScriptedCatalog {
    async fn list(
        &self,
        _peer_id: &PeerId,
        file_name: &str,
        _address: &str,
        _port: u16,
    ) -> Result<(), CatalogError> {
        self.check_up()?;
        if self.failing_names.lock().unwrap().contains(file_name) {
            return Err(CatalogError::Unavailable("store hiccup".into()));
        }
        self.listed.lock().unwrap().push(file_name.to_string());
        Ok(())
    }

    async fn delist(&self, file_name: &str, _peer_id: &PeerId) -> Result<bool, CatalogError> {
        self.check_up()?;
        if self.failing_delists.lock().unwrap().contains(file_name) {
            return Err(CatalogError::Unavailable("store hiccup".into()));
        }
        self.delisted.lock().unwrap().push(file_name.to_string());
        Ok(true)
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, CatalogError> {
        Ok(Vec::new())
    }

    async fn resolve_owner(&self, _id: EntryId) -> Result<Option<OwnerLocation>, CatalogError> {
        Ok(None)
    }

    async fn heartbeat(&self, _peer_id: &PeerId) -> Result<bool, CatalogError> {
        self.check_up()?;
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(self.heartbeat_renews.load(Ordering::SeqCst))
    }

    async fn disconnect(&self, _peer_id: &PeerId) -> Result<(), CatalogError> {
        self.check_up()?;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn liveness_window(&self) -> Result<Duration, CatalogError> {
        Ok(Duration::from_secs(120))
    }
}

fn share_with(files: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("share dir");
    for name in files {
        fs::write(dir.path().join(name), name.as_bytes()).expect("write share file");
    }
    dir
}

fn agent_for(catalog: Arc<dyn CatalogApi>, share: &TempDir) -> PeerAgent {
    PeerAgent::new(
        catalog,
        PeerId::from("peer-under-test"),
        share.path(),
        "127.0.0.1",
        9100,
    )
}

#[tokio::test]
async fn lost_listings_are_restored_within_the_same_tick() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(CatalogRegistry::new(store.clone(), LivenessPolicy::default()));
    let share = share_with(&["A.txt", "B.txt"]);
    let mut agent = agent_for(registry.clone(), &share);

    let first = agent.reconcile().await;
    assert_eq!(first.listed, 2);
    assert_eq!(first.renewed, Some(true));

    // Registry loses every row of this peer behind the agent's back.
    let wiped = store.delete_owner(agent.peer_id()).expect("wipe");
    assert_eq!(wiped, 2);

    let second = agent.reconcile().await;
    assert_eq!(second.resyncs, 1);
    assert_eq!(second.listed, 2);
    assert_eq!(second.renewed, Some(true));

    let mut names: Vec<String> = registry
        .search("")
        .expect("search")
        .into_iter()
        .map(|hit| hit.file_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["A.txt", "B.txt"]);
}

#[tokio::test]
async fn immediate_resyncs_stop_at_the_bound() {
    let catalog = ScriptedCatalog::forgetful();
    let share = share_with(&["only.bin"]);
    let mut agent = agent_for(catalog.clone(), &share);

    let report = agent.reconcile().await;

    assert_eq!(report.resyncs, MAX_IMMEDIATE_RESYNCS);
    assert_eq!(report.renewed, Some(false));
    // Initial pass plus one per resync.
    assert_eq!(catalog.listed.lock().unwrap().len(), MAX_IMMEDIATE_RESYNCS + 1);
    assert_eq!(
        catalog.heartbeats.load(Ordering::SeqCst),
        MAX_IMMEDIATE_RESYNCS + 1
    );

    // The next tick gets a fresh budget.
    let next = agent.reconcile().await;
    assert_eq!(next.resyncs, MAX_IMMEDIATE_RESYNCS);
}

#[tokio::test]
async fn one_failing_list_does_not_block_the_others() {
    let catalog = ScriptedCatalog::renewing();
    catalog
        .failing_names
        .lock()
        .unwrap()
        .insert("bad.txt".to_string());
    let share = share_with(&["bad.txt", "good.txt"]);
    let mut agent = agent_for(catalog.clone(), &share);

    let report = agent.reconcile().await;
    assert_eq!(report.listed, 1);
    assert_eq!(report.failures, 1);
    assert!(agent.known().contains("good.txt"));
    assert!(!agent.known().contains("bad.txt"));

    // Recovered registry: the failed name is retried, the good one is not re-sent.
    catalog.failing_names.lock().unwrap().clear();
    let retry = agent.reconcile().await;
    assert_eq!(retry.listed, 1);
    assert_eq!(
        *catalog.listed.lock().unwrap(),
        vec!["good.txt".to_string(), "bad.txt".to_string()]
    );
}

#[tokio::test]
async fn removed_files_are_delisted() {
    let catalog = ScriptedCatalog::renewing();
    let share = share_with(&["keep.txt", "drop.txt"]);
    let mut agent = agent_for(catalog.clone(), &share);
    agent.reconcile().await;

    fs::remove_file(share.path().join("drop.txt")).expect("remove");
    let report = agent.reconcile().await;

    assert_eq!(report.delisted, 1);
    assert_eq!(*catalog.delisted.lock().unwrap(), vec!["drop.txt".to_string()]);
    assert_eq!(agent.known().len(), 1);
}

#[tokio::test]
async fn failed_delist_is_retried_on_the_next_cycle() {
    let catalog = ScriptedCatalog::renewing();
    let share = share_with(&["keep.txt", "drop.txt"]);
    let mut agent = agent_for(catalog.clone(), &share);
    agent.reconcile().await;

    catalog
        .failing_delists
        .lock()
        .unwrap()
        .insert("drop.txt".to_string());
    fs::remove_file(share.path().join("drop.txt")).expect("remove");
    let report = agent.reconcile().await;

    assert_eq!(report.delisted, 0);
    assert!(report.failures >= 1);
    assert!(agent.known().contains("drop.txt"));
    assert!(catalog.delisted.lock().unwrap().is_empty());

    catalog.failing_delists.lock().unwrap().clear();
    let report = agent.reconcile().await;

    assert_eq!(report.delisted, 1);
    assert_eq!(*catalog.delisted.lock().unwrap(), vec!["drop.txt".to_string()]);
    assert!(!agent.known().contains("drop.txt"));
    assert!(agent.known().contains("keep.txt"));
}

#[tokio::test]
async fn empty_share_directory_skips_the_registry() {
    let catalog = ScriptedCatalog::renewing();
    let share = share_with(&[]);
    let mut agent = agent_for(catalog.clone(), &share);

    let report = agent.reconcile().await;
    assert!(report.idle);
    assert_eq!(report.renewed, None);
    assert_eq!(catalog.calls(), 0);
}

#[rstest]
#[case::registry_down(true)]
#[case::registry_up(false)]
#[tokio::test]
async fn registry_failures_never_escape_the_cycle(#[case] down: bool) {
    let catalog = ScriptedCatalog::renewing();
    catalog.down.store(down, Ordering::SeqCst);
    let share = share_with(&["a.txt"]);
    let mut agent = agent_for(catalog.clone(), &share);

    let report = agent.reconcile().await;
    if down {
        assert_eq!(report.listed, 0);
        assert_eq!(report.failures, 2, "list and heartbeat both fail");
        assert_eq!(report.renewed, None);
        assert!(agent.known().is_empty());
    } else {
        assert_eq!(report.failures, 0);
        assert_eq!(report.renewed, Some(true));
    }
}

#[tokio::test]
async fn heartbeat_without_known_listings_does_not_resync() {
    let catalog = ScriptedCatalog::forgetful();
    catalog
        .failing_names
        .lock()
        .unwrap()
        .insert("a.txt".to_string());
    let share = share_with(&["a.txt"]);
    let mut agent = agent_for(catalog.clone(), &share);

    let report = agent.reconcile().await;
    assert_eq!(report.resyncs, 0);
    assert_eq!(report.renewed, Some(false));
    assert_eq!(catalog.heartbeats.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_disconnects_exactly_once() {
    let catalog = ScriptedCatalog::renewing();
    let share = share_with(&["a.txt"]);
    let mut agent = agent_for(catalog.clone(), &share);
    agent.reconcile().await;

    agent.shutdown().await.expect("disconnect");
    agent.shutdown().await.expect("second shutdown is a no-op");

    assert_eq!(catalog.disconnects.load(Ordering::SeqCst), 1);
    assert!(agent.known().is_empty());
}
