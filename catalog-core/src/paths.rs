//! Default on-disk locations.
//!
//! ```text
//! ~/.catalog/
//!   server.yaml      (registry server config, optional)
//!   peer.yaml        (peer config, optional)
//!   registry.yaml    (snapshot store)
//!   peer_id          (persisted peer identity, mode 0600)
//!   share/           (files offered to other peers)
//!   downloads/       (files fetched from other peers)
//! ```
//!
//! Every helper takes an explicit `home`; [`home`] resolves the real one.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const SERVER_CONFIG: &str = "server.yaml";
pub const PEER_CONFIG: &str = "peer.yaml";
pub const STORE_SNAPSHOT: &str = "registry.yaml";
pub const PEER_IDENTITY: &str = "peer_id";

pub fn catalog_root(home: &Path) -> PathBuf {
    home.join(".catalog")
}

pub fn server_config_path(home: &Path) -> PathBuf {
    catalog_root(home).join(SERVER_CONFIG)
}

pub fn peer_config_path(home: &Path) -> PathBuf {
    catalog_root(home).join(PEER_CONFIG)
}

pub fn store_path(home: &Path) -> PathBuf {
    catalog_root(home).join(STORE_SNAPSHOT)
}

pub fn identity_path(home: &Path) -> PathBuf {
    catalog_root(home).join(PEER_IDENTITY)
}

pub fn share_dir(home: &Path) -> PathBuf {
    catalog_root(home).join("share")
}

pub fn download_dir(home: &Path) -> PathBuf {
    catalog_root(home).join("downloads")
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
