//! Peer stream reactor
//!
//! One reactor per live peer stream, running as its own task. The two
//! stream roles differ only in handshake order: the dialing side sends its
//! hello first, the accepting side answers. Steady state is identical for
//! both: a read loop feeding the engine and a periodic write tick draining
//! the split-horizon query.

use crate::syncer::Syncer;
use futures::{SinkExt, StreamExt};
use statemesh_core::{NodeId, SyncMessageBatch};
use statemesh_net::wire::{decode_batch, encode_batch};
use statemesh_net::{Frame, FrameCodec, FrameError, FrameType, Hello};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

/// How long a stream may sit in the hello exchange before it is rejected
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Framed peer stream
pub type PeerLink = Framed<TcpStream, FrameCodec>;

/// Reactor errors
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Decode error: {0}")]
    Decode(#[from] postcard::Error),
    #[error("Peer closed the stream before hello")]
    MissingHello,
    #[error("Unexpected frame type: {0:?}")]
    UnexpectedFrame(FrameType),
    #[error("Handshake timed out")]
    HandshakeTimeout,
}

/// Dial-side bootstrap: send our hello, learn the peer's node id
pub async fn dial_handshake(link: &mut PeerLink, local: &NodeId) -> Result<NodeId, ReactorError> {
    let hello = Hello {
        node_id: local.clone(),
    };
    link.send(hello.to_frame()?).await?;
    read_hello(link).await
}

/// Accept-side bootstrap: learn the peer's node id, answer with ours
pub async fn accept_handshake(link: &mut PeerLink, local: &NodeId) -> Result<NodeId, ReactorError> {
    let peer_id = read_hello(link).await?;
    let hello = Hello {
        node_id: local.clone(),
    };
    link.send(hello.to_frame()?).await?;
    Ok(peer_id)
}

async fn read_hello(link: &mut PeerLink) -> Result<NodeId, ReactorError> {
    let frame = timeout(HANDSHAKE_TIMEOUT, link.next())
        .await
        .map_err(|_| ReactorError::HandshakeTimeout)?
        .ok_or(ReactorError::MissingHello)??;

    if frame.frame_type != FrameType::Hello {
        return Err(ReactorError::UnexpectedFrame(frame.frame_type));
    }
    Ok(Hello::from_frame(&frame)?.node_id)
}

/// State machine for one post-handshake peer stream.
///
/// Owns the stream and a reusable outbound batch; everything is dropped
/// together when the stream terminates.
pub struct PeerReactor {
    syncer: Arc<Syncer>,
    peer_id: NodeId,
    link: PeerLink,
    /// Outbound scratch, cleared in place each tick
    out: SyncMessageBatch,
    tick_interval: Duration,
    epoch: u64,
}

impl PeerReactor {
    pub(crate) fn new(
        syncer: Arc<Syncer>,
        peer_id: NodeId,
        link: PeerLink,
        tick_interval: Duration,
        epoch: u64,
    ) -> Self {
        Self {
            syncer,
            peer_id,
            link,
            out: SyncMessageBatch::new(),
            tick_interval,
            epoch,
        }
    }

    /// Drive the stream until it terminates, then deregister from the
    /// engine's peer map
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.tick().await {
                        warn!(peer = %self.peer_id, "Write failed: {}", error);
                        break;
                    }
                }
                frame = self.link.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Err(error) = self.handle_frame(frame) {
                                warn!(peer = %self.peer_id, "Protocol violation: {}", error);
                                break;
                            }
                        }
                        Some(Err(error)) => {
                            warn!(peer = %self.peer_id, "Stream error: {}", error);
                            break;
                        }
                        None => {
                            debug!(peer = %self.peer_id, "Peer closed the stream");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!(peer = %self.peer_id, "Shutting down stream");
                    break;
                }
            }
        }

        self.syncer.remove_peer(&self.peer_id, self.epoch);
    }

    /// One write cycle: refresh local snapshots, drain the split-horizon
    /// query, write a single batch frame. An empty query writes nothing.
    async fn tick(&mut self) -> Result<(), ReactorError> {
        self.syncer.refresh_local();

        self.out.clear();
        self.syncer
            .collect_sync_messages(&self.peer_id, &mut self.out.sync_messages);
        if self.out.is_empty() {
            return Ok(());
        }

        trace!(peer = %self.peer_id, count = self.out.len(), "Writing sync batch");
        let frame = encode_batch(&self.out)?;
        self.link.send(frame).await?;
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) -> Result<(), ReactorError> {
        match frame.frame_type {
            FrameType::SyncBatch => {
                let batch = decode_batch(&frame)?;
                trace!(peer = %self.peer_id, count = batch.len(), "Received sync batch");
                self.syncer.update_batch(&self.peer_id, &batch);
                Ok(())
            }
            other => Err(ReactorError::UnexpectedFrame(other)),
        }
    }
}
