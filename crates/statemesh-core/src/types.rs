//! Core protocol types for StateMesh
//!
//! All types here are designed for deterministic serialization via postcard.
//! Field order matters for canonical encoding.

use crate::error::Error;
use serde::{Deserialize, Serialize};

// =============================================================================
// IDENTITY TYPES (newtypes for type safety)
// =============================================================================

/// Cluster-unique node identifier, stable for a process lifetime.
///
/// Opaque to the sync layer; the bootstrap layer decides what goes in it
/// (hostname, pod name, random token).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// Number of component slots; bounds the reporter/receiver registry arrays.
pub const COMPONENT_COUNT: usize = 2;

/// Identifier of a syncable local component.
///
/// A closed set known at compile time. Each component owns at most one
/// reporter and one receiver per process.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentId {
    /// Per-node resource availability view
    ResourceView = 0,
    /// Cluster membership table
    Membership = 1,
}

impl ComponentId {
    /// All component ids, in slot order
    pub const ALL: [ComponentId; COMPONENT_COUNT] =
        [ComponentId::ResourceView, ComponentId::Membership];

    /// Registry slot index for this component
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for ComponentId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ResourceView),
            1 => Ok(Self::Membership),
            _ => Err(Error::UnknownComponent(value)),
        }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceView => f.write_str("resource_view"),
            Self::Membership => f.write_str("membership"),
        }
    }
}

// =============================================================================
// SYNC MESSAGES
// =============================================================================

/// One versioned component snapshot.
///
/// `version` is monotonically non-decreasing per (originator, component);
/// on a tie the existing entry wins. `payload` is opaque to the sync layer
/// and interpreted only by the matching receiver.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncMessage {
    /// Originator: the node whose reporter produced this message
    pub node_id: NodeId,
    /// Component this snapshot belongs to
    pub component_id: ComponentId,
    /// Snapshot version, allocated by the originator
    pub version: u64,
    /// Opaque component payload
    pub payload: Vec<u8>,
}

/// Ordered sequence of sync messages; the wire frame body.
///
/// Batches written to the wire always carry at least one message. An empty
/// tick produces no frame at all.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncMessageBatch {
    pub sync_messages: Vec<SyncMessage>,
}

impl SyncMessageBatch {
    /// Empty reusable batch
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sync_messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sync_messages.is_empty()
    }

    /// Drop all messages, keeping the allocation for reuse
    pub fn clear(&mut self) {
        self.sync_messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_roundtrip() {
        for id in ComponentId::ALL {
            assert_eq!(ComponentId::try_from(id as u8).unwrap(), id);
        }
        assert!(ComponentId::try_from(COMPONENT_COUNT as u8).is_err());
    }

    #[test]
    fn test_component_index_in_bounds() {
        for id in ComponentId::ALL {
            assert!(id.index() < COMPONENT_COUNT);
        }
    }

    #[test]
    fn test_sync_message_encoding() {
        let message = SyncMessage {
            node_id: NodeId::from("node-1"),
            component_id: ComponentId::ResourceView,
            version: 7,
            payload: vec![1, 2, 3],
        };

        let bytes = postcard::to_allocvec(&message).unwrap();
        let decoded: SyncMessage = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_batch_clear_keeps_capacity() {
        let mut batch = SyncMessageBatch::new();
        batch.sync_messages.push(SyncMessage {
            node_id: NodeId::from("node-1"),
            component_id: ComponentId::Membership,
            version: 1,
            payload: vec![],
        });
        let capacity = batch.sync_messages.capacity();

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.sync_messages.capacity(), capacity);
    }
}
