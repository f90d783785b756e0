//! Leader-side stream listener
//!
//! Accepts follower streams, runs the accept handshake, and hands the
//! stream to the engine. A handshake failure rejects only that stream.

use crate::reactor::{self, ReactorError};
use crate::syncer::Syncer;
use statemesh_net::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::interval;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reactor error: {0}")]
    Reactor(#[from] ReactorError),
}

/// Listener accepting follower streams for one engine
pub struct Server {
    syncer: Arc<Syncer>,
    listener: TcpListener,
}

impl Server {
    /// Bind the listener. Kept separate from [`Server::run`] so callers can
    /// read the bound address before accepting.
    pub async fn bind(addr: SocketAddr, syncer: Arc<Syncer>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { syncer, listener })
    }

    /// Bound listen address
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept streams until the engine shuts down
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Listening on {}", self.local_addr()?);

        let mut shutdown_rx = self.syncer.subscribe_shutdown();
        let mut stats_ticker = interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection from {}", addr);
                            let syncer = self.syncer.clone();
                            tokio::spawn(async move {
                                if let Err(error) = handle_stream(syncer, stream, addr).await {
                                    warn!("Stream rejected from {}: {}", addr, error);
                                }
                            });
                        }
                        Err(error) => {
                            error!("Accept error: {}", error);
                        }
                    }
                }
                _ = stats_ticker.tick() => {
                    let stats = self.syncer.stats();
                    debug!(
                        peers = stats.peer_count,
                        messages = stats.message_count,
                        "Engine stats"
                    );
                }
                _ = shutdown_rx.recv() => {
                    info!("Listener shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Per-stream entry point: handshake, then hand ownership to the engine
async fn handle_stream(
    syncer: Arc<Syncer>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), ReactorError> {
    let mut link = Framed::new(stream, FrameCodec::new());
    let peer_id = reactor::accept_handshake(&mut link, syncer.node_id()).await?;
    info!(peer = %peer_id, %addr, "Follower stream established");
    syncer.attach_peer(peer_id, link);
    Ok(())
}
