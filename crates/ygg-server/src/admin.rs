//! Management requests over TCP, so a running node can be steered while its
//! driver holds the topology store.
//!
//! Every frame is a big-endian `u32` length followed by a bincode payload. A
//! connection carries any number of request/reply pairs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use ygg_storage::TopologyStore;
use ygg_types::TopologyError;

use crate::handler::TopologyManagementRequestsHandler;
use crate::request::{TopologyManagementRequest, TopologyManagementResponse};

const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// What the node answers to one request.
pub type AdminReply = Result<TopologyManagementResponse, TopologyError>;

/// Accepts admin connections on `listener` until `shutdown` resolves. Open
/// connections are closed on shutdown.
pub async fn serve_admin<S: TopologyStore>(
    listener: TcpListener,
    handler: Arc<TopologyManagementRequestsHandler<S>>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "admin server starting");

    let (stop, _) = broadcast::channel::<()>(1);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = stop.send(());
                tracing::info!("admin server stopped");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept admin connection");
                        continue;
                    }
                };
                let handler = handler.clone();
                let mut stop_rx = stop.subscribe();
                tokio::spawn(async move {
                    tokio::select! {
                        result = handle_connection(stream, &handler) => {
                            if let Err(e) = result {
                                tracing::warn!(%peer, error = %e, "admin connection failed");
                            }
                        }
                        _ = stop_rx.recv() => {}
                    }
                });
            }
        }
    }
}

async fn handle_connection<S, T>(
    mut stream: T,
    handler: &TopologyManagementRequestsHandler<S>,
) -> anyhow::Result<()>
where
    S: TopologyStore,
    T: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(payload) = read_frame(&mut stream).await? {
        let request: TopologyManagementRequest = decode(&payload)?;
        tracing::debug!(?request, "admin request");
        let reply: AdminReply = handler.handle(request).await;
        write_frame(&mut stream, &encode(&reply)?).await?;
    }
    Ok(())
}

/// `None` when the peer closed the stream between frames.
async fn read_frame<T: AsyncRead + Unpin>(stream: &mut T) -> anyhow::Result<Option<Vec<u8>>> {
    let len = match stream.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("frame of {len} bytes exceeds the limit of {MAX_FRAME_BYTES}");
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_frame<T: AsyncWrite + Unpin>(stream: &mut T, payload: &[u8]) -> anyhow::Result<()> {
    let len = u32::try_from(payload.len()).context("frame too large")?;
    stream.write_u32(len).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

fn encode<T: serde::Serialize>(val: &T) -> anyhow::Result<Vec<u8>> {
    bincode::serde::encode_to_vec(val, bincode::config::standard()).context("failed to encode frame")
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .context("failed to decode frame")
}

/// Client side of the admin protocol.
pub struct AdminClient {
    stream: TcpStream,
}

impl AdminClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to admin server at {addr}"))?;
        Ok(AdminClient { stream })
    }

    /// Sends one request and waits for the reply. Transport failures are the
    /// outer error; the node's verdict is the inner one.
    pub async fn request(&mut self, request: &TopologyManagementRequest) -> anyhow::Result<AdminReply> {
        write_frame(&mut self.stream, &encode(request)?).await?;
        let payload = read_frame(&mut self.stream)
            .await?
            .context("admin server closed the connection")?;
        decode(&payload)
    }
}
