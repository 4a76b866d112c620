//! Catalog registry server: TCP protocol, reaper, and runtime.

pub mod client;
mod error;
pub mod periodic;
pub mod protocol;
pub mod reaper;
mod runtime;

pub use client::RemoteCatalog;
pub use error::ServerError;
pub use periodic::{run_periodic, spawn_periodic, PeriodicJob};
pub use protocol::{send_request, CatalogRequest, CatalogResponse, ErrorCode};
pub use reaper::{spawn_reaper, Reaper};
pub use runtime::{init_tracing, open_store, run, start_blocking, RegistryServer};
