//! Catalog core library: listing types, the registry store, and the
//! registration API.
//!
//! - [`types`]: newtypes and the [`FileEntry`] row
//! - [`store`]: [`RegistryStore`] and its memory / snapshot backends
//! - [`registry`]: [`CatalogRegistry`], the liveness-aware API over a store
//! - [`api`]: [`CatalogApi`], the async surface peers program against
//! - [`config`] / [`paths`]: YAML configuration and default locations

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod paths;
pub mod registry;
pub mod store;
pub mod types;

pub use api::CatalogApi;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OverflowPolicy, PeerConfig, ServerConfig, StoreBackend};
pub use error::{CatalogError, ConfigError, StoreError};
pub use registry::{CatalogRegistry, LivenessPolicy};
pub use store::{MemoryStore, RegistryStore, SnapshotStore};
pub use types::{EntryId, FileEntry, OwnerLocation, PeerId, SearchHit};
