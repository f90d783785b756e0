//! Syncer engine
//!
//! Owns the message store, the component registry, and the set of peer
//! reactors. Followers hold a single reactor for the leader link; the
//! leader holds one per accepted follower. All store mutation funnels
//! through [`Syncer::update`].

use crate::reactor::{self, PeerLink, PeerReactor, ReactorError};
use crate::registry::{ComponentRegistry, Receiver, Reporter};
use crate::store::{ClusterView, IngestOutcome};
use parking_lot::RwLock;
use statemesh_core::{ComponentId, NodeId, SyncMessage, SyncMessageBatch};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Running reactor owned by the engine
struct PeerHandle {
    task: JoinHandle<()>,
    /// Distinguishes a reactor from its replacement under the same node id
    epoch: u64,
}

/// Engine statistics
#[derive(Debug, Clone)]
pub struct SyncerStats {
    pub peer_count: usize,
    pub message_count: usize,
    pub bucket_count: usize,
}

/// Cluster state synchronization engine.
///
/// One instance per process; multiple instances coexist in tests. Wrap in
/// an [`Arc`] before attaching peers.
pub struct Syncer {
    node_id: NodeId,
    view: ClusterView,
    registry: ComponentRegistry,
    peers: RwLock<HashMap<NodeId, PeerHandle>>,
    next_epoch: AtomicU64,
    tick_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl Syncer {
    /// Create an engine bound to a local node id
    pub fn new(node_id: NodeId, tick_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            node_id,
            view: ClusterView::new(),
            registry: ComponentRegistry::new(),
            peers: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(0),
            tick_interval,
            shutdown_tx,
        }
    }

    /// Local node id
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Bind a reporter and receiver to a component slot
    pub fn register(
        &self,
        component_id: ComponentId,
        reporter: Option<Arc<dyn Reporter>>,
        receiver: Option<Arc<dyn Receiver>>,
    ) {
        self.registry.register(component_id, reporter, receiver);
    }

    /// Offer one message learned from `from_peer`.
    ///
    /// On acceptance the registered receiver for the component is invoked;
    /// receiver failures are logged and delivery is not retried.
    pub fn update(&self, from_peer: &NodeId, message: &SyncMessage) -> IngestOutcome {
        match self.view.ingest(from_peer, message) {
            IngestOutcome::Accepted => {
                if let Some(receiver) = self.registry.receiver(message.component_id) {
                    if let Err(error) = receiver.update(message) {
                        warn!(
                            component = %message.component_id,
                            originator = %message.node_id,
                            "Receiver rejected update: {}",
                            error
                        );
                    }
                }
                IngestOutcome::Accepted
            }
            IngestOutcome::Stale => IngestOutcome::Stale,
        }
    }

    /// Per-message loop over an inbound batch
    pub fn update_batch(&self, from_peer: &NodeId, batch: &SyncMessageBatch) {
        for message in &batch.sync_messages {
            self.update(from_peer, message);
        }
    }

    /// Pull a snapshot from every registered reporter into the store under
    /// the local node id. Step one of every tick.
    pub fn refresh_local(&self) {
        for (component, reporter) in self.registry.reporters() {
            let message = reporter.snapshot();
            if self.update(&self.node_id, &message) == IngestOutcome::Accepted {
                debug!(component = %component, version = message.version, "Local snapshot advanced");
            }
        }
    }

    /// Split-horizon query: everything to send to `peer`
    pub fn sync_messages(&self, peer: &NodeId) -> Vec<SyncMessage> {
        self.view.messages_for(peer)
    }

    /// Buffer-reusing variant of [`Syncer::sync_messages`]
    pub fn collect_sync_messages(&self, peer: &NodeId, out: &mut Vec<SyncMessage>) {
        self.view.collect_for(peer, out);
    }

    /// Message store, for bucket introspection
    pub fn view(&self) -> &ClusterView {
        &self.view
    }

    /// Dial the leader, run the hello exchange, and attach the resulting
    /// reactor. A second call replaces the previous leader link.
    pub async fn follow(self: Arc<Self>, leader_addr: SocketAddr) -> Result<NodeId, ReactorError> {
        let stream = TcpStream::connect(leader_addr).await?;
        let mut link = Framed::new(stream, statemesh_net::FrameCodec::new());
        let leader_id = reactor::dial_handshake(&mut link, &self.node_id).await?;
        info!(leader = %leader_id, addr = %leader_addr, "Following leader");
        self.attach_peer(leader_id.clone(), link);
        Ok(leader_id)
    }

    /// Take ownership of a post-handshake stream and spawn its reactor.
    ///
    /// Used for both roles: the listener calls this after the accept
    /// handshake, [`Syncer::follow`] after the dial handshake.
    pub fn attach_peer(self: Arc<Self>, peer_id: NodeId, link: PeerLink) {
        self.view.ensure_bucket(&peer_id);

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let reactor = PeerReactor::new(
            Arc::clone(&self),
            peer_id.clone(),
            link,
            self.tick_interval,
            epoch,
        );
        let task = tokio::spawn(reactor.run(self.shutdown_tx.subscribe()));

        let mut peers = self.peers.write();
        if let Some(previous) = peers.insert(peer_id.clone(), PeerHandle { task, epoch }) {
            warn!(peer = %peer_id, "Replacing existing stream for peer");
            previous.task.abort();
        }
    }

    /// Reactor self-removal on stream termination.
    ///
    /// The epoch guard keeps a replaced reactor from evicting its
    /// successor's entry.
    pub(crate) fn remove_peer(&self, peer_id: &NodeId, epoch: u64) {
        let mut peers = self.peers.write();
        if peers.get(peer_id).is_some_and(|handle| handle.epoch == epoch) {
            peers.remove(peer_id);
            debug!(peer = %peer_id, "Peer removed");
        }
    }

    /// Whether a live reactor exists for a peer
    pub fn has_peer(&self, peer_id: &NodeId) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    /// Number of live peer streams
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Shutdown receiver for tasks tied to this engine's lifetime
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Stop every reactor and drop the peer map. Store contents survive.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let mut peers = self.peers.write();
        for (peer_id, handle) in peers.drain() {
            handle.task.abort();
            debug!(peer = %peer_id, "Peer stream aborted");
        }
    }

    /// Engine statistics
    pub fn stats(&self) -> SyncerStats {
        SyncerStats {
            peer_count: self.peer_count(),
            message_count: self.view.message_count(),
            bucket_count: self.view.bucket_count(),
        }
    }
}
