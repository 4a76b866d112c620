//! Domain types for the catalog registry.
//!
//! A [`FileEntry`] is one row of the registry table. Its natural key is the
//! [`ListingKey`] (file name + owner endpoint); the numeric [`EntryId`] is the
//! indirection handed out by search and consumed by resolve.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque per-agent identity used as the owner of every listing it creates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PeerId {
    /// Leading characters only; the full identity authorizes delist and
    /// disconnect, so it stays out of logs.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Row identifier assigned by the store on first insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for EntryId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Natural key of a listing: the same file offered from the same endpoint
/// is one row no matter how often it is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingKey {
    pub file_name: String,
    pub address: String,
    pub port: u16,
}

/// Registration request for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewListing {
    pub owner: PeerId,
    pub file_name: String,
    pub address: String,
    pub port: u16,
}

impl NewListing {
    pub fn key(&self) -> ListingKey {
        ListingKey {
            file_name: self.file_name.clone(),
            address: self.address.clone(),
            port: self.port,
        }
    }
}

/// One registered file offered by one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: EntryId,
    pub file_name: String,
    pub owner_peer_id: PeerId,
    pub owner_address: String,
    pub owner_port: u16,
    pub last_seen: DateTime<Utc>,
}

impl FileEntry {
    pub fn key(&self) -> ListingKey {
        ListingKey {
            file_name: self.file_name.clone(),
            address: self.owner_address.clone(),
            port: self.owner_port,
        }
    }

    /// `now - last_seen <= ttl`.
    pub fn is_alive(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match cutoff(now, ttl) {
            Some(cutoff) => self.last_seen >= cutoff,
            None => true,
        }
    }

    pub fn location(&self) -> OwnerLocation {
        OwnerLocation {
            file_name: self.file_name.clone(),
            address: self.owner_address.clone(),
            port: self.owner_port,
        }
    }
}

/// Search result: an id to resolve plus the file name to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: EntryId,
    pub file_name: String,
}

/// Where to fetch a file from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerLocation {
    pub file_name: String,
    pub address: String,
    pub port: u16,
}

impl OwnerLocation {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Saturating conversion; TTLs too large for chrono behave as "forever".
pub fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `now - d`, or `None` when that underflows the representable range.
pub fn cutoff(now: DateTime<Utc>, d: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(chrono_duration(d))
}

/// A bare file name: non-empty, no path separators, not `.` or `..`.
pub fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
