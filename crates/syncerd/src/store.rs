//! Version-aware message store bucketed by learning source
//!
//! Messages are keyed twice: the outer bucket is the peer a message was
//! most recently learned from (or the local node id for self-generated
//! snapshots), the inner key is (originator, component). Bucketing by
//! learning source is what makes broadcast cheap: when sending to a peer
//! we simply skip that peer's bucket, so nothing is ever echoed back to
//! where it came from.

use parking_lot::RwLock;
use statemesh_core::{ComponentId, NodeId, SyncMessage};
use std::collections::HashMap;

/// Result of offering a message to the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Message was fresher than anything known and is now stored
    Accepted,
    /// Message version was not newer than the stored one; dropped
    Stale,
}

type PairKey = (NodeId, ComponentId);

#[derive(Default)]
struct ViewInner {
    /// from_node_id -> (originator, component) -> freshest message
    buckets: HashMap<NodeId, HashMap<PairKey, SyncMessage>>,
    /// (originator, component) -> (bucket holding it, version)
    freshest: HashMap<PairKey, (NodeId, u64)>,
}

/// Cluster-wide view of the freshest message per (originator, component).
///
/// The freshest message for a pair lives in exactly one bucket; a superseded
/// copy is pruned when a newer version arrives through a different peer.
#[derive(Default)]
pub struct ClusterView {
    inner: RwLock<ViewInner>,
}

impl ClusterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotently create an empty bucket so later queries are stable
    pub fn ensure_bucket(&self, node_id: &NodeId) {
        let mut inner = self.inner.write();
        if !inner.buckets.contains_key(node_id) {
            inner.buckets.insert(node_id.clone(), HashMap::new());
        }
    }

    /// Offer a message learned from `from_peer`.
    ///
    /// Accepts only strictly newer versions; a tie keeps the existing entry.
    pub fn ingest(&self, from_peer: &NodeId, message: &SyncMessage) -> IngestOutcome {
        let mut inner = self.inner.write();
        let key = (message.node_id.clone(), message.component_id);

        if let Some((bucket, version)) = inner.freshest.get(&key).cloned() {
            if message.version <= version {
                return IngestOutcome::Stale;
            }
            if &bucket != from_peer {
                if let Some(entries) = inner.buckets.get_mut(&bucket) {
                    entries.remove(&key);
                }
            }
        }

        inner
            .freshest
            .insert(key.clone(), (from_peer.clone(), message.version));
        inner
            .buckets
            .entry(from_peer.clone())
            .or_default()
            .insert(key, message.clone());

        IngestOutcome::Accepted
    }

    /// Append every freshest message except those learned from `peer`.
    ///
    /// Clears nothing; callers reuse the same buffer across ticks.
    pub fn collect_for(&self, peer: &NodeId, out: &mut Vec<SyncMessage>) {
        let inner = self.inner.read();
        for (bucket, entries) in &inner.buckets {
            if bucket == peer {
                continue;
            }
            out.extend(entries.values().cloned());
        }
    }

    /// Split-horizon query returning a fresh vector
    pub fn messages_for(&self, peer: &NodeId) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        self.collect_for(peer, &mut out);
        out
    }

    /// Which bucket currently holds the freshest entry for a pair
    pub fn bucket_of(&self, originator: &NodeId, component: ComponentId) -> Option<NodeId> {
        let inner = self.inner.read();
        inner
            .freshest
            .get(&(originator.clone(), component))
            .map(|(bucket, _)| bucket.clone())
    }

    /// Freshest known version for a pair
    pub fn version_of(&self, originator: &NodeId, component: ComponentId) -> Option<u64> {
        let inner = self.inner.read();
        inner
            .freshest
            .get(&(originator.clone(), component))
            .map(|(_, version)| *version)
    }

    /// Total number of stored messages
    pub fn message_count(&self) -> usize {
        self.inner.read().freshest.len()
    }

    /// Number of buckets, including empty ones
    pub fn bucket_count(&self) -> usize {
        self.inner.read().buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(originator: &str, component: ComponentId, version: u64) -> SyncMessage {
        SyncMessage {
            node_id: NodeId::from(originator),
            component_id: component,
            version,
            payload: format!("{}@{}", originator, version).into_bytes(),
        }
    }

    #[test]
    fn test_first_ingest_accepted() {
        let view = ClusterView::new();
        let peer = NodeId::from("peer-a");
        let msg = message("node-1", ComponentId::ResourceView, 1);

        assert_eq!(view.ingest(&peer, &msg), IngestOutcome::Accepted);
        assert_eq!(view.message_count(), 1);
        assert_eq!(
            view.bucket_of(&msg.node_id, ComponentId::ResourceView),
            Some(peer)
        );
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let view = ClusterView::new();
        let peer = NodeId::from("peer-a");
        let msg = message("node-1", ComponentId::ResourceView, 1);

        assert_eq!(view.ingest(&peer, &msg), IngestOutcome::Accepted);
        assert_eq!(view.ingest(&peer, &msg), IngestOutcome::Stale);
        assert_eq!(view.message_count(), 1);
        assert_eq!(view.messages_for(&NodeId::from("other")).len(), 1);
    }

    #[test]
    fn test_stale_version_dropped_store_wide() {
        let view = ClusterView::new();
        let peer_a = NodeId::from("peer-a");
        let peer_b = NodeId::from("peer-b");

        view.ingest(&peer_a, &message("node-1", ComponentId::ResourceView, 5));
        assert_eq!(
            view.ingest(&peer_b, &message("node-1", ComponentId::ResourceView, 3)),
            IngestOutcome::Stale
        );

        // The v5 copy is untouched and still lives under peer-a
        assert_eq!(
            view.version_of(&NodeId::from("node-1"), ComponentId::ResourceView),
            Some(5)
        );
        assert_eq!(
            view.bucket_of(&NodeId::from("node-1"), ComponentId::ResourceView),
            Some(peer_a)
        );
    }

    #[test]
    fn test_newer_version_moves_bucket() {
        let view = ClusterView::new();
        let peer_a = NodeId::from("peer-a");
        let peer_b = NodeId::from("peer-b");
        let originator = NodeId::from("node-1");

        view.ingest(&peer_a, &message("node-1", ComponentId::ResourceView, 1));
        view.ingest(&peer_b, &message("node-1", ComponentId::ResourceView, 2));

        assert_eq!(
            view.bucket_of(&originator, ComponentId::ResourceView),
            Some(peer_b.clone())
        );
        // Exactly one copy survives; the shadow under peer-a is pruned
        assert_eq!(view.message_count(), 1);
        let visible = view.messages_for(&NodeId::from("other"));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].version, 2);
    }

    #[test]
    fn test_version_tie_keeps_existing() {
        let view = ClusterView::new();
        let peer_a = NodeId::from("peer-a");
        let peer_b = NodeId::from("peer-b");

        view.ingest(&peer_a, &message("node-1", ComponentId::Membership, 4));
        assert_eq!(
            view.ingest(&peer_b, &message("node-1", ComponentId::Membership, 4)),
            IngestOutcome::Stale
        );
        assert_eq!(
            view.bucket_of(&NodeId::from("node-1"), ComponentId::Membership),
            Some(peer_a)
        );
    }

    #[test]
    fn test_split_horizon() {
        let view = ClusterView::new();
        let peer_a = NodeId::from("peer-a");
        let peer_b = NodeId::from("peer-b");

        view.ingest(&peer_a, &message("node-1", ComponentId::ResourceView, 1));
        view.ingest(&peer_b, &message("node-2", ComponentId::ResourceView, 1));

        // Nothing learned from a peer is ever offered back to it
        let for_a = view.messages_for(&peer_a);
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].node_id, NodeId::from("node-2"));

        let for_b = view.messages_for(&peer_b);
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].node_id, NodeId::from("node-1"));

        // A third peer sees everything
        assert_eq!(view.messages_for(&NodeId::from("peer-c")).len(), 2);
    }

    #[test]
    fn test_versions_never_regress() {
        let view = ClusterView::new();
        let peer = NodeId::from("peer-a");
        let originator = NodeId::from("node-1");

        let mut observed = 0;
        for version in [1, 3, 2, 7, 7, 5, 9] {
            view.ingest(&peer, &message("node-1", ComponentId::ResourceView, version));
            let current = view
                .version_of(&originator, ComponentId::ResourceView)
                .unwrap();
            assert!(current >= observed);
            observed = current;
        }
        assert_eq!(observed, 9);
    }

    #[test]
    fn test_ensure_bucket_is_idempotent() {
        let view = ClusterView::new();
        let peer = NodeId::from("peer-a");

        view.ensure_bucket(&peer);
        view.ingest(&peer, &message("node-1", ComponentId::ResourceView, 1));
        view.ensure_bucket(&peer);

        assert_eq!(view.bucket_count(), 1);
        assert_eq!(view.message_count(), 1);
    }

    #[test]
    fn test_collect_for_appends_without_clearing() {
        let view = ClusterView::new();
        let peer = NodeId::from("peer-a");
        view.ingest(&peer, &message("node-1", ComponentId::ResourceView, 1));

        let mut buffer = Vec::new();
        view.collect_for(&NodeId::from("other"), &mut buffer);
        view.collect_for(&NodeId::from("other"), &mut buffer);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_distinct_originators_per_component() {
        let view = ClusterView::new();
        let leader = NodeId::from("leader");

        view.ingest(&leader, &message("node-a", ComponentId::ResourceView, 1));
        view.ingest(&leader, &message("node-b", ComponentId::ResourceView, 1));

        assert_eq!(view.message_count(), 2);
        assert_eq!(view.messages_for(&NodeId::from("other")).len(), 2);
    }
}
