//! Registry server runtime: TCP listener + reaper + ctrl-c handling.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use catalog_core::{
    CatalogRegistry, MemoryStore, RegistryStore, ServerConfig, SnapshotStore, StoreBackend,
};

use crate::error::{io_err, ServerError};
use crate::protocol::{CatalogRequest, CatalogResponse, ErrorCode};
use crate::reaper::spawn_reaper;

/// Start the registry and block the current thread until it exits.
pub fn start_blocking(config: ServerConfig, home: &Path) -> Result<(), ServerError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, home.to_path_buf()))
}

/// Run the registry until ctrl-c.
pub async fn run(config: ServerConfig, home: PathBuf) -> Result<(), ServerError> {
    let server = RegistryServer::bind(&config, &home).await?;
    let cancel = CancellationToken::new();

    let signal_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down registry");
                            Ok(())
                        }
                        Err(err) => Err(ServerError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let served = server.serve(cancel.clone()).await;
    cancel.cancel();
    handle_join("signal_handler", signal_handle.await)?;
    served
}

/// Open the configured store. Failing here is fatal for the server.
pub fn open_store(
    config: &ServerConfig,
    home: &Path,
) -> Result<Arc<dyn RegistryStore>, ServerError> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; listings are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Snapshot => {
            let path = config.store_path_or_default(home);
            let store = SnapshotStore::open(&path)?;
            tracing::info!(path = %path.display(), "registry store opened");
            Ok(Arc::new(store))
        }
    }
}

/// A bound, not yet serving, registry.
pub struct RegistryServer {
    listener: TcpListener,
    registry: Arc<CatalogRegistry>,
    store: StoreBackend,
    reaper_interval: Duration,
}

impl RegistryServer {
    /// Open the store and bind the listener from `config`.
    pub async fn bind(config: &ServerConfig, home: &Path) -> Result<Self, ServerError> {
        let store = open_store(config, home)?;
        let registry = Arc::new(CatalogRegistry::new(store, config.policy()));
        let mut server =
            Self::bind_with_registry(&config.listen, registry, config.reaper_interval()).await?;
        server.store = config.store;
        Ok(server)
    }

    /// Bind `listen` around an already-built registry.
    pub async fn bind_with_registry(
        listen: &str,
        registry: Arc<CatalogRegistry>,
        reaper_interval: Duration,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| io_err(listen, e))?;
        Ok(Self {
            listener,
            registry,
            store: StoreBackend::Memory,
            reaper_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| io_err("registry listener", e))
    }

    pub fn registry(&self) -> Arc<CatalogRegistry> {
        self.registry.clone()
    }

    /// Accept clients and run the reaper until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let local = self.local_addr()?;
        let context = Arc::new(ServerContext {
            registry: self.registry.clone(),
            listen: local.to_string(),
            store: self.store,
            reaper_interval: self.reaper_interval,
            started_at_unix: unix_seconds_now(),
        });

        let policy = self.registry.policy();
        tracing::info!(
            listen = %local,
            ttl_secs = policy.ttl.as_secs(),
            grace_secs = policy.grace.as_secs(),
            "registry listening"
        );

        let reaper = spawn_reaper(self.registry.clone(), self.reaper_interval, cancel.child_token());

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let context = context.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(stream, context, cancel).await {
                            tracing::warn!(remote = %remote, error = %err, "registry client error");
                        }
                    });
                }
            }
        };

        cancel.cancel();
        if let Err(err) = reaper.await {
            tracing::error!(error = %err, "reaper task join failure");
        }
        tracing::info!("registry stopped");
        result
    }
}

struct ServerContext {
    registry: Arc<CatalogRegistry>,
    listen: String,
    store: StoreBackend,
    reaper_interval: Duration,
    started_at_unix: u64,
}

async fn handle_client(
    stream: TcpStream,
    context: Arc<ServerContext>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.map_err(|e| io_err("registry socket read", e))?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let request: CatalogRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &CatalogResponse::error(
                        ErrorCode::BadRequest,
                        format!("invalid request JSON: {err}"),
                    ),
                )
                .await?;
                continue;
            }
        };

        tracing::debug!(cmd = request.name(), "registry request");
        let ctx = context.clone();
        // Store statements may touch disk; keep them off the async workers.
        let response = match tokio::task::spawn_blocking(move || dispatch(&ctx, request)).await {
            Ok(response) => response,
            Err(err) => CatalogResponse::error(
                ErrorCode::Unavailable,
                format!("request handler failed: {err}"),
            ),
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

fn dispatch(context: &ServerContext, request: CatalogRequest) -> CatalogResponse {
    let registry = &context.registry;
    let result = match request {
        CatalogRequest::List {
            peer_id,
            file_name,
            address,
            port,
        } => registry
            .list(&peer_id, &file_name, &address, port)
            .map(|entry| json!({ "id": entry.id })),
        CatalogRequest::Delist { file_name, peer_id } => registry
            .delist(&file_name, &peer_id)
            .map(|removed| json!({ "removed": removed })),
        CatalogRequest::Search { query } => {
            registry.search(&query).map(|hits| json!({ "hits": hits }))
        }
        CatalogRequest::ResolveOwner { id } => registry
            .resolve_owner(id)
            .map(|owner| json!({ "owner": owner })),
        CatalogRequest::Heartbeat { peer_id } => registry
            .heartbeat(&peer_id)
            .map(|renewed| json!({ "renewed": renewed })),
        CatalogRequest::Disconnect { peer_id } => registry
            .disconnect(&peer_id)
            .map(|removed| json!({ "removed": removed })),
        CatalogRequest::LivenessWindow => Ok(json!({
            "ttl_ms": duration_ms(registry.liveness_window()),
        })),
        CatalogRequest::Status => Ok(build_status_payload(context)),
    };

    match result {
        Ok(data) => CatalogResponse::ok(data),
        Err(err) => CatalogResponse::from_catalog_error(&err),
    }
}

fn build_status_payload(context: &ServerContext) -> Value {
    let policy = context.registry.policy();
    let entries = match context.registry.entry_count() {
        Ok(count) => json!(count),
        Err(err) => {
            tracing::warn!(error = %err, "entry count unavailable for status");
            Value::Null
        }
    };

    json!({
        "running": true,
        "listen": context.listen,
        "store": context.store,
        "started_at_unix": context.started_at_unix,
        "ttl_secs": policy.ttl.as_secs(),
        "grace_secs": policy.grace.as_secs(),
        "reaper_interval_secs": context.reaper_interval.as_secs(),
        "entries": entries,
    })
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &CatalogResponse,
) -> Result<(), ServerError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("registry socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("registry socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ServerError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
