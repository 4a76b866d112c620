//! Peer runtime: transfer endpoint + reconciliation agent until ctrl-c.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use catalog_core::{paths, CatalogApi, EntryId, LivenessPolicy, PeerConfig};
use catalog_server::{spawn_periodic, RemoteCatalog};

use crate::agent::{heartbeat_period, PeerAgent};
use crate::error::{io_err, PeerError};
use crate::identity;
use crate::transfer::{download, TransferEndpoint, TransferReport};

/// Run the peer until ctrl-c, then disconnect.
pub async fn run(config: PeerConfig, home: PathBuf) -> Result<(), PeerError> {
    let cancel = CancellationToken::new();
    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => tracing::info!("received ctrl-c, shutting down peer"),
                        Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
                    }
                    cancel.cancel();
                }
            }
        })
    };

    let result = run_until(config, home, cancel.clone()).await;
    cancel.cancel();
    let _ = signal.await;
    result
}

/// Run the peer until `cancel` fires.
pub async fn run_until(
    config: PeerConfig,
    home: PathBuf,
    cancel: CancellationToken,
) -> Result<(), PeerError> {
    let peer_id = identity::load_or_create(&paths::identity_path(&home))?;
    let share_dir = config.share_dir_or_default(&home);
    std::fs::create_dir_all(&share_dir).map_err(|e| io_err(&share_dir, e))?;

    let endpoint = TransferEndpoint::bind(
        &config.transfer_listen,
        &share_dir,
        config.max_connections,
        config.overflow,
    )
    .await?
    .with_request_timeout(config.request_timeout());
    let port = endpoint.local_addr()?.port();

    let catalog: Arc<dyn CatalogApi> =
        Arc::new(RemoteCatalog::new(&config.registry, config.rpc_timeout()));
    let ttl = match catalog.liveness_window().await {
        Ok(ttl) => ttl,
        Err(err) => {
            let fallback = LivenessPolicy::default().ttl;
            tracing::warn!(
                error = %err,
                fallback_secs = fallback.as_secs(),
                "cannot read liveness window; using default"
            );
            fallback
        }
    };
    let period = heartbeat_period(ttl, config.heartbeat_floor());

    tracing::info!(
        peer = peer_id.short(),
        registry = %config.registry,
        advertise = %config.advertise_address,
        port,
        period_secs = period.as_secs(),
        "peer starting"
    );

    let agent = PeerAgent::new(
        catalog,
        peer_id,
        &share_dir,
        config.advertise_address.clone(),
        port,
    );
    let endpoint_handle = tokio::spawn(endpoint.serve(cancel.child_token()));
    let agent_handle = spawn_periodic(agent, period, cancel.child_token());

    cancel.cancelled().await;

    let mut agent = agent_handle.await.map_err(|err| PeerError::Join {
        task: "reconcile",
        reason: err.to_string(),
    })?;
    if let Err(err) = agent.shutdown().await {
        tracing::warn!(error = %err, "disconnect failed; listings will expire by TTL");
    }
    if let Err(err) = endpoint_handle.await {
        tracing::error!(error = %err, "transfer endpoint join failure");
    }
    Ok(())
}

/// Resolve `id` against the registry and download it.
pub async fn fetch(
    config: &PeerConfig,
    home: &Path,
    id: EntryId,
) -> Result<TransferReport, PeerError> {
    let catalog = RemoteCatalog::new(&config.registry, config.rpc_timeout());
    let location = catalog
        .resolve_owner(id)
        .await?
        .ok_or(PeerError::NotFound(id))?;
    let report = download(
        &location,
        &config.download_dir_or_default(home),
        config.connect_timeout(),
    )
    .await?;
    Ok(report)
}
