//! Catalog peer: share-directory agent, transfer endpoint, and identity.

pub mod agent;
mod error;
pub mod identity;
mod runtime;
pub mod transfer;

pub use agent::{heartbeat_period, CycleReport, PeerAgent, MAX_IMMEDIATE_RESYNCS};
pub use error::{PeerError, TransferError};
pub use runtime::{fetch, run, run_until};
pub use transfer::{download, TransferEndpoint, TransferReport};
