//! Wire message envelopes
//!
//! Every peer stream starts with a `Hello` in each direction; after that
//! the stream carries only sync message batches.

use crate::framing::{Frame, FrameType};
use serde::{Deserialize, Serialize};
use statemesh_core::{NodeId, SyncMessageBatch};

/// Stream handshake message.
///
/// Sent once per direction when a stream opens. A stream whose first frame
/// is anything else is a protocol violation and is torn down.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Sender's local node id
    pub node_id: NodeId,
}

impl Hello {
    pub fn to_frame(&self) -> Result<Frame, postcard::Error> {
        let payload = postcard::to_allocvec(self)?;
        Ok(Frame::new(FrameType::Hello, payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, postcard::Error> {
        postcard::from_bytes(&frame.payload)
    }
}

/// Encode a batch into a sync frame
pub fn encode_batch(batch: &SyncMessageBatch) -> Result<Frame, postcard::Error> {
    let payload = postcard::to_allocvec(batch)?;
    Ok(Frame::new(FrameType::SyncBatch, payload))
}

/// Decode a sync frame back into a batch
pub fn decode_batch(frame: &Frame) -> Result<SyncMessageBatch, postcard::Error> {
    postcard::from_bytes(&frame.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statemesh_core::{ComponentId, SyncMessage};

    #[test]
    fn test_hello_roundtrip() {
        let hello = Hello {
            node_id: NodeId::from("node-7"),
        };

        let frame = hello.to_frame().unwrap();
        assert_eq!(frame.frame_type, FrameType::Hello);
        assert_eq!(Hello::from_frame(&frame).unwrap(), hello);
    }

    #[test]
    fn test_batch_roundtrip() {
        let batch = SyncMessageBatch {
            sync_messages: vec![SyncMessage {
                node_id: NodeId::from("node-1"),
                component_id: ComponentId::ResourceView,
                version: 3,
                payload: b"cpu=4".to_vec(),
            }],
        };

        let frame = encode_batch(&batch).unwrap();
        assert_eq!(frame.frame_type, FrameType::SyncBatch);
        assert_eq!(decode_batch(&frame).unwrap(), batch);
    }

    #[test]
    fn test_garbage_payload_fails_decode() {
        let frame = Frame::new(FrameType::SyncBatch, vec![0xff; 3]);
        assert!(decode_batch(&frame).is_err());
    }
}
