//! Registry store: one key-constrained table of [`FileEntry`] rows.
//!
//! # Atomicity
//!
//! Every trait method is one statement against the table: it takes the table
//! lock exactly once, so concurrent `upsert`/`touch_owner`/`delete_seen_before`
//! calls on the same row serialize without any locking in the caller.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local table, lost on restart.
//! - [`SnapshotStore`]: same table, persisted after every mutating statement
//!   to a YAML snapshot.
//!
//! ```text
//! ~/.catalog/
//!   registry.yaml       (snapshot, mode 0600, replaced via registry.yaml.tmp)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::types::{EntryId, FileEntry, ListingKey, NewListing, PeerId, SearchHit};

/// Storage backend contract used by the catalog registry.
pub trait RegistryStore: Send + Sync {
    /// Insert, or on key conflict refresh `last_seen` and owner in place.
    fn upsert(&self, listing: &NewListing, now: DateTime<Utc>) -> Result<FileEntry, StoreError>;

    /// Delete the row named `file_name` owned by `owner`. Returns rows removed.
    fn delete_owned(&self, file_name: &str, owner: &PeerId) -> Result<usize, StoreError>;

    /// Refresh `last_seen` of every row owned by `owner`. Returns rows touched.
    fn touch_owner(&self, owner: &PeerId, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Delete every row owned by `owner`. Returns rows removed.
    fn delete_owner(&self, owner: &PeerId) -> Result<usize, StoreError>;

    /// Delete every row with `last_seen < cutoff`. Returns rows removed.
    fn delete_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Case-insensitive substring match over rows with `last_seen >= seen_since`,
    /// ordered by id.
    fn search(&self, query: &str, seen_since: Option<DateTime<Utc>>)
        -> Result<Vec<SearchHit>, StoreError>;

    fn get(&self, id: EntryId) -> Result<Option<FileEntry>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// The table plus its natural-key index. Methods are the statements.
#[derive(Debug, Clone, Default)]
struct Table {
    next_id: u64,
    rows: BTreeMap<EntryId, FileEntry>,
    by_key: HashMap<ListingKey, EntryId>,
}

/// On-disk form of [`Table`]; the key index is rebuilt on load.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    next_id: u64,
    #[serde(default)]
    entries: Vec<FileEntry>,
}

const SNAPSHOT_VERSION: u32 = 1;

impl Table {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut table = Table {
            next_id: snapshot.next_id,
            ..Table::default()
        };
        for entry in snapshot.entries {
            table.next_id = table.next_id.max(entry.id.0 + 1);
            table.by_key.insert(entry.key(), entry.id);
            table.rows.insert(entry.id, entry);
        }
        table
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            next_id: self.next_id,
            entries: self.rows.values().cloned().collect(),
        }
    }

    fn upsert(&mut self, listing: &NewListing, now: DateTime<Utc>) -> FileEntry {
        let key = listing.key();
        if let Some(id) = self.by_key.get(&key) {
            if let Some(row) = self.rows.get_mut(id) {
                row.last_seen = row.last_seen.max(now);
                return row.clone();
            }
        }

        let id = EntryId(self.next_id);
        self.next_id += 1;
        let row = FileEntry {
            id,
            file_name: listing.file_name.clone(),
            owner_peer_id: listing.owner.clone(),
            owner_address: listing.address.clone(),
            owner_port: listing.port,
            last_seen: now,
        };
        self.by_key.insert(key, id);
        self.rows.insert(id, row.clone());
        row
    }

    fn delete_where(&mut self, mut doomed: impl FnMut(&FileEntry) -> bool) -> usize {
        let before = self.rows.len();
        let by_key = &mut self.by_key;
        self.rows.retain(|_, row| {
            if doomed(row) {
                by_key.remove(&row.key());
                false
            } else {
                true
            }
        });
        before - self.rows.len()
    }

    fn touch_owner(&mut self, owner: &PeerId, now: DateTime<Utc>) -> usize {
        let mut touched = 0;
        for row in self.rows.values_mut().filter(|r| &r.owner_peer_id == owner) {
            row.last_seen = row.last_seen.max(now);
            touched += 1;
        }
        touched
    }

    fn search(&self, query: &str, seen_since: Option<DateTime<Utc>>) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        self.rows
            .values()
            .filter(|row| seen_since.map_or(true, |since| row.last_seen >= since))
            .filter(|row| row.file_name.to_lowercase().contains(&needle))
            .map(|row| SearchHit {
                id: row.id,
                file_name: row.file_name.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store (tests and throwaway registries).
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryStore {
    fn upsert(&self, listing: &NewListing, now: DateTime<Utc>) -> Result<FileEntry, StoreError> {
        Ok(self.table.lock().upsert(listing, now))
    }

    fn delete_owned(&self, file_name: &str, owner: &PeerId) -> Result<usize, StoreError> {
        Ok(self
            .table
            .lock()
            .delete_where(|r| r.file_name == file_name && &r.owner_peer_id == owner))
    }

    fn touch_owner(&self, owner: &PeerId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.table.lock().touch_owner(owner, now))
    }

    fn delete_owner(&self, owner: &PeerId) -> Result<usize, StoreError> {
        Ok(self.table.lock().delete_where(|r| &r.owner_peer_id == owner))
    }

    fn delete_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.table.lock().delete_where(|r| r.last_seen < cutoff))
    }

    fn search(
        &self,
        query: &str,
        seen_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        Ok(self.table.lock().search(query, seen_since))
    }

    fn get(&self, id: EntryId) -> Result<Option<FileEntry>, StoreError> {
        Ok(self.table.lock().rows.get(&id).cloned())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.table.lock().rows.len())
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// YAML-persisted store.
///
/// A mutating statement is applied to a copy of the table, the copy is written
/// atomically (serialize → `.tmp` sibling → `chmod 0600` → `rename`), and only
/// then swapped in. A failed write leaves both memory and disk unchanged.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl SnapshotStore {
    /// Open the snapshot at `path`, creating an empty one if absent.
    ///
    /// Fails if the file cannot be read or parsed, or if the directory is not
    /// writable; a registry must not start serving on top of either.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let snapshot: Snapshot = serde_yaml::from_str(&contents)
                .map_err(|source| StoreError::Parse {
                    path: path.clone(),
                    source,
                })?;
            Table::from_snapshot(snapshot)
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            let table = Table::default();
            write_snapshot(&path, &table)?;
            table
        };

        tracing::info!(
            path = %path.display(),
            entries = table.rows.len(),
            "opened registry snapshot",
        );
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one mutating statement; persist only if it changed rows.
    fn mutate<R>(
        &self,
        statement: impl FnOnce(&mut Table) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> Result<R, StoreError> {
        let mut guard = self.table.lock();
        let mut next = guard.clone();
        let out = statement(&mut next);
        if changed(&out) {
            write_snapshot(&self.path, &next)?;
            *guard = next;
        }
        Ok(out)
    }
}

impl RegistryStore for SnapshotStore {
    fn upsert(&self, listing: &NewListing, now: DateTime<Utc>) -> Result<FileEntry, StoreError> {
        self.mutate(|t| t.upsert(listing, now), |_| true)
    }

    fn delete_owned(&self, file_name: &str, owner: &PeerId) -> Result<usize, StoreError> {
        self.mutate(
            |t| t.delete_where(|r| r.file_name == file_name && &r.owner_peer_id == owner),
            |n| *n > 0,
        )
    }

    fn touch_owner(&self, owner: &PeerId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.mutate(|t| t.touch_owner(owner, now), |n| *n > 0)
    }

    fn delete_owner(&self, owner: &PeerId) -> Result<usize, StoreError> {
        self.mutate(|t| t.delete_where(|r| &r.owner_peer_id == owner), |n| *n > 0)
    }

    fn delete_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.mutate(|t| t.delete_where(|r| r.last_seen < cutoff), |n| *n > 0)
    }

    fn search(
        &self,
        query: &str,
        seen_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        Ok(self.table.lock().search(query, seen_since))
    }

    fn get(&self, id: EntryId) -> Result<Option<FileEntry>, StoreError> {
        Ok(self.table.lock().rows.get(&id).cloned())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.table.lock().rows.len())
    }
}

fn write_snapshot(path: &Path, table: &Table) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "registry.yaml".to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(&table.to_snapshot())?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
