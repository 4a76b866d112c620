//! YAML configuration for the registry server and for peers.
//!
//! Every field has a default, and a missing file is the same as an empty one,
//! so both processes start with no configuration at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths;
use crate::registry::LivenessPolicy;

/// Periodic tasks never run with a zero period.
const MIN_PERIOD: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Snapshot,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` the registry listens on.
    pub listen: String,
    pub store: StoreBackend,
    /// Snapshot location; defaults to `~/.catalog/registry.yaml`.
    pub store_path: Option<PathBuf>,
    pub ttl_secs: u64,
    pub grace_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7070".to_string(),
            store: StoreBackend::Snapshot,
            store_path: None,
            ttl_secs: 120,
            grace_secs: 60,
            reaper_interval_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        Self::load_from(&paths::server_config_path(home))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_yaml(path)
    }

    pub fn policy(&self) -> LivenessPolicy {
        LivenessPolicy::new(
            Duration::from_secs(self.ttl_secs),
            Duration::from_secs(self.grace_secs),
        )
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs).max(MIN_PERIOD)
    }

    pub fn store_path_or_default(&self, home: &Path) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| paths::store_path(home))
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// What the transfer endpoint does with a connection beyond `max_connections`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Hold the connection until a slot frees up.
    #[default]
    Queue,
    /// Close it immediately.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// `host:port` of the registry server.
    pub registry: String,
    pub share_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    /// Bind address of the transfer endpoint; port 0 picks a free port.
    pub transfer_listen: String,
    /// Address other peers are told to connect to.
    pub advertise_address: String,
    pub heartbeat_floor_secs: u64,
    pub rpc_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// How long an accepted transfer connection may take to send its name.
    pub request_timeout_secs: u64,
    pub max_connections: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            registry: "127.0.0.1:7070".to_string(),
            share_dir: None,
            download_dir: None,
            transfer_listen: "0.0.0.0:0".to_string(),
            advertise_address: "127.0.0.1".to_string(),
            heartbeat_floor_secs: 10,
            rpc_timeout_secs: 5,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            max_connections: 8,
            overflow: OverflowPolicy::Queue,
        }
    }
}

impl PeerConfig {
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        Self::load_from(&paths::peer_config_path(home))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_yaml(path)
    }

    pub fn heartbeat_floor(&self) -> Duration {
        Duration::from_secs(self.heartbeat_floor_secs).max(MIN_PERIOD)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs).max(MIN_PERIOD)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs).max(MIN_PERIOD)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs).max(MIN_PERIOD)
    }

    pub fn share_dir_or_default(&self, home: &Path) -> PathBuf {
        self.share_dir
            .clone()
            .unwrap_or_else(|| paths::share_dir(home))
    }

    pub fn download_dir_or_default(&self, home: &Path) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| paths::download_dir(home))
    }
}

fn load_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
