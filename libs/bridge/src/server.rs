use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use observer_api::{Ack, BridgeRequest};

use crate::{BridgeError, LengthPrefixed};

/// Receives every decoded bridge call. Must not block: it runs on the
/// connection task.
pub trait BridgeHandler: Send + Sync {
    fn handle(&self, request: BridgeRequest) -> Ack;
}

// ═══════════════════════════════════════════════════════════════
//  BridgeServer: accept loop → per-connection frame loop → handler
// ═══════════════════════════════════════════════════════════════

pub struct BridgeServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    framing: LengthPrefixed,
}

impl BridgeServer {
    /// Bind on `addr`. Port `0` picks an ephemeral port; see [`Self::local_addr`].
    pub async fn bind(addr: &str, framing: LengthPrefixed) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| BridgeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "bridge listening");
        Ok(Self {
            listener,
            local_addr,
            framing,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn spawn(
        self,
        handler: Arc<dyn BridgeHandler>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.serve(handler, token))
    }

    /// Accept until `token` is cancelled. Open connections stop with it.
    pub async fn serve(self, handler: Arc<dyn BridgeHandler>, token: CancellationToken) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "bridge client connected");
                            let handler = handler.clone();
                            let token = token.clone();
                            let framing = self.framing;
                            tokio::spawn(async move {
                                tokio::select! {
                                    result = handle_connection(stream, framing, &*handler) => {
                                        if let Err(e) = result {
                                            tracing::warn!(%peer, error = %e, "bridge connection failed");
                                        }
                                    }
                                    _ = token.cancelled() => {}
                                }
                                tracing::debug!(%peer, "bridge client disconnected");
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "bridge accept error");
                        }
                    }
                }
                _ = token.cancelled() => break,
            }
        }
        tracing::info!(addr = %self.local_addr, "bridge stopped");
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    framing: LengthPrefixed,
    handler: &dyn BridgeHandler,
) -> Result<(), BridgeError> {
    stream.set_nodelay(true)?;
    while let Some(frame) = framing.read_frame(&mut stream).await? {
        let ack = match BridgeRequest::decode(&frame) {
            Ok(request) => handler.handle(request),
            Err(e) => {
                tracing::warn!(error = %e, len = frame.len(), "malformed bridge request");
                Ack::malformed()
            }
        };
        framing.write_frame(&mut stream, &ack.encode()?).await?;
    }
    Ok(())
}
