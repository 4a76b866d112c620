//! Peer-to-peer file transfer.
//!
//! One exchange per TCP connection:
//!
//! ```text
//! request  := <u16 BE name length> <UTF-8 name>
//! response := <u64 BE byte count> <bytes>
//! ```
//!
//! A responder that does not offer the name closes without writing anything.
//! A requester that does not send its name within the request timeout is
//! dropped, releasing its connection slot.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use catalog_core::types::is_valid_file_name;
use catalog_core::{OverflowPolicy, OwnerLocation};

use crate::error::TransferError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Encode `name` as a length-prefixed frame.
pub async fn write_name_frame<W>(writer: &mut W, name: &str) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(name.len()).map_err(|_| TransferError::NameTooLong(name.len()))?;
    writer.write_u16(len).await.map_err(TransferError::Stream)?;
    writer
        .write_all(name.as_bytes())
        .await
        .map_err(TransferError::Stream)?;
    writer.flush().await.map_err(TransferError::Stream)?;
    Ok(())
}

pub async fn read_name_frame<R>(reader: &mut R) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await.map_err(TransferError::Stream)?;
    let mut buf = vec![0u8; usize::from(len)];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(TransferError::Stream)?;
    Ok(String::from_utf8(buf)?)
}

/// Serves files from a share directory.
pub struct TransferEndpoint {
    listener: TcpListener,
    share_dir: PathBuf,
    slots: Arc<Semaphore>,
    overflow: OverflowPolicy,
    request_timeout: Duration,
}

impl TransferEndpoint {
    pub async fn bind(
        listen: &str,
        share_dir: impl Into<PathBuf>,
        max_connections: usize,
        overflow: OverflowPolicy,
    ) -> Result<Self, TransferError> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|source| TransferError::Io {
                path: PathBuf::from(listen),
                source,
            })?;
        Ok(Self {
            listener,
            share_dir: share_dir.into(),
            slots: Arc::new(Semaphore::new(max_connections.max(1))),
            overflow,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bound on how long an accepted connection may hold a slot before its
    /// name frame arrives.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransferError> {
        self.listener.local_addr().map_err(TransferError::Stream)
    }

    /// Accept until `cancel` fires. In-flight transfers are left to finish
    /// on their own.
    pub async fn serve(self, cancel: CancellationToken) {
        let share_dir = Arc::new(self.share_dir);
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(
                listen = %addr,
                share_dir = %share_dir.display(),
                overflow = ?self.overflow,
                request_timeout = ?self.request_timeout,
                "transfer endpoint listening"
            );
        }

        loop {
            let (stream, remote) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "transfer accept failed");
                        continue;
                    }
                },
            };

            let permit = match self.overflow {
                OverflowPolicy::Reject => match self.slots.clone().try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        tracing::warn!(remote = %remote, "transfer slots exhausted; rejecting");
                        drop(stream);
                        continue;
                    }
                },
                OverflowPolicy::Queue => None,
            };

            let slots = self.slots.clone();
            let share_dir = share_dir.clone();
            let request_timeout = self.request_timeout;
            tokio::spawn(async move {
                let _permit = match permit {
                    Some(permit) => permit,
                    None => match slots.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                if let Err(err) = respond(stream, &share_dir, request_timeout).await {
                    tracing::warn!(remote = %remote, error = %err, "transfer failed");
                }
            });
        }

        tracing::info!("transfer endpoint stopped");
    }
}

async fn respond(
    mut stream: TcpStream,
    share_dir: &Path,
    request_timeout: Duration,
) -> Result<(), TransferError> {
    let name = tokio::time::timeout(request_timeout, read_name_frame(&mut stream))
        .await
        .map_err(|_| TransferError::RequestTimeout {
            timeout_ms: request_timeout.as_millis(),
        })??;

    let Some(mut file) = open_offered(share_dir, &name).await else {
        tracing::info!(file_name = %name, "requested file not offered; closing");
        return Ok(());
    };
    let path = share_dir.join(&name);
    let declared = file
        .metadata()
        .await
        .map_err(|source| TransferError::Io {
            path: path.clone(),
            source,
        })?
        .len();

    stream
        .write_u64(declared)
        .await
        .map_err(TransferError::Stream)?;
    let sent = tokio::io::copy(&mut (&mut file).take(declared), &mut stream)
        .await
        .map_err(TransferError::Stream)?;
    stream.flush().await.map_err(TransferError::Stream)?;
    let _ = stream.shutdown().await;

    if sent == declared {
        tracing::info!(file_name = %name, bytes = sent, "served file");
    } else {
        tracing::warn!(file_name = %name, declared, sent, "file shrank while serving");
    }
    Ok(())
}

/// Open `name` only if it is a plain, non-hidden file directly in `share_dir`.
async fn open_offered(share_dir: &Path, name: &str) -> Option<File> {
    if name.starts_with('.') || !is_valid_file_name(name) {
        return None;
    }
    let path = share_dir.join(name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => File::open(&path).await.ok(),
        _ => None,
    }
}

/// Result of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub file_name: String,
    pub path: PathBuf,
    pub declared: u64,
    pub received: u64,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.declared == self.received
    }
}

/// Fetch `location.file_name` from its owner into `download_dir`.
///
/// `timeout` bounds the connect and, separately, the wait for the length
/// header. A short stream is not an error: the partial file is kept and the
/// report carries both counts.
pub async fn download(
    location: &OwnerLocation,
    download_dir: &Path,
    timeout: Duration,
) -> Result<TransferReport, TransferError> {
    let name = &location.file_name;
    if !is_valid_file_name(name) {
        return Err(TransferError::InvalidFileName(name.clone()));
    }

    let addr = location.socket_addr();
    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(TransferError::Connect { addr, source }),
        Err(_) => {
            return Err(TransferError::ConnectTimeout {
                addr,
                timeout_ms: timeout.as_millis(),
            })
        }
    };

    let header = tokio::time::timeout(timeout, request_header(&mut stream, name)).await;
    let declared = match header {
        Ok(declared) => declared?,
        Err(_) => {
            return Err(TransferError::ResponseTimeout {
                addr,
                timeout_ms: timeout.as_millis(),
            })
        }
    };

    tokio::fs::create_dir_all(download_dir)
        .await
        .map_err(|source| TransferError::Io {
            path: download_dir.to_path_buf(),
            source,
        })?;
    let path = download_dir.join(name);
    let mut file = File::create(&path)
        .await
        .map_err(|source| TransferError::Io {
            path: path.clone(),
            source,
        })?;

    let received = tokio::io::copy(&mut (&mut stream).take(declared), &mut file)
        .await
        .map_err(|source| TransferError::Io {
            path: path.clone(),
            source,
        })?;
    file.flush().await.map_err(|source| TransferError::Io {
        path: path.clone(),
        source,
    })?;

    let report = TransferReport {
        file_name: name.clone(),
        path,
        declared,
        received,
    };
    if report.is_complete() {
        tracing::info!(file_name = %name, bytes = received, from = %addr, "download complete");
    } else {
        tracing::warn!(
            file_name = %name,
            declared,
            received,
            from = %addr,
            "download size mismatch"
        );
    }
    Ok(report)
}

/// Send the name frame and read back the declared length.
async fn request_header(stream: &mut TcpStream, name: &str) -> Result<u64, TransferError> {
    write_name_frame(stream, name).await?;
    match stream.read_u64().await {
        Ok(declared) => Ok(declared),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(TransferError::NotOffered(name.to_string()))
        }
        Err(err) => Err(TransferError::Stream(err)),
    }
}
