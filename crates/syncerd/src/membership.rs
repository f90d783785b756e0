//! Built-in cluster membership component
//!
//! Implements both sides of the reporter/receiver plane for
//! [`ComponentId::Membership`]: it snapshots the local node's info and
//! folds remote snapshots into a live table of known cluster nodes.

use crate::registry::{Receiver, Reporter};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statemesh_core::{ComponentId, NodeId, SyncMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// One node's membership record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node identifier
    pub node_id: NodeId,
    /// Address the node can be reached at, if it serves one
    pub addr: Option<SocketAddr>,
    /// Process start time (unix millis)
    pub started_at_ms: u64,
    /// Bumped whenever the local record changes; doubles as the sync version
    pub incarnation: u64,
}

/// Live membership table for one process
pub struct ClusterMembership {
    local: RwLock<NodeInfo>,
    nodes: RwLock<HashMap<NodeId, NodeInfo>>,
}

impl ClusterMembership {
    pub fn new(node_id: NodeId, addr: Option<SocketAddr>) -> Self {
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            local: RwLock::new(NodeInfo {
                node_id,
                addr,
                started_at_ms,
                incarnation: 1,
            }),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Change the advertised address; bumps the incarnation so the new
    /// record propagates
    pub fn advertise(&self, addr: SocketAddr) {
        let mut local = self.local.write();
        local.addr = Some(addr);
        local.incarnation += 1;
    }

    /// Local node record
    pub fn local(&self) -> NodeInfo {
        self.local.read().clone()
    }

    /// Record for a remote node, if known
    pub fn get(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.nodes.read().get(node_id).cloned()
    }

    /// All known remote nodes, sorted by node id
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    /// Number of known remote nodes
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

impl Reporter for ClusterMembership {
    fn snapshot(&self) -> SyncMessage {
        let local = self.local.read();
        SyncMessage {
            node_id: local.node_id.clone(),
            component_id: ComponentId::Membership,
            version: local.incarnation,
            payload: postcard::to_allocvec(&*local).unwrap_or_default(),
        }
    }
}

impl Receiver for ClusterMembership {
    fn update(&self, message: &SyncMessage) -> anyhow::Result<()> {
        let info: NodeInfo = postcard::from_bytes(&message.payload)?;
        anyhow::ensure!(
            info.node_id == message.node_id,
            "membership payload for {} arrived under originator {}",
            info.node_id,
            message.node_id
        );

        if info.node_id == self.local.read().node_id {
            return Ok(());
        }

        let previous = self.nodes.write().insert(info.node_id.clone(), info.clone());
        match previous {
            None => info!(node = %info.node_id, "Node joined the cluster"),
            Some(previous) if previous.incarnation != info.incarnation => {
                debug!(node = %info.node_id, incarnation = info.incarnation, "Node record refreshed");
            }
            Some(_) => {}
        }
        Ok(())
    }
}
