//! Message framing for peer streams
//!
//! Provides length-prefixed framing over a raw byte stream.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (4 MB)
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A framed message
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame type
    pub frame_type: FrameType,
    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Frame types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Stream handshake carrying the sender's node id
    Hello = 0,
    /// Batch of sync messages
    SyncBatch = 10,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Hello),
            10 => Ok(Self::SyncBatch),
            _ => Err(FrameError::Serialization(format!("Unknown frame type: {}", value))),
        }
    }
}

/// Codec for length-prefixed frames
///
/// Wire format:
/// - 4 bytes: length (big-endian, includes type byte)
/// - 1 byte: frame type
/// - N bytes: payload
#[derive(Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least 5 bytes (4 length + 1 type)
        if src.len() < 5 {
            return Ok(None);
        }

        // Peek at length
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(length));
        }

        // Need full frame
        if src.len() < 4 + length {
            return Ok(None);
        }

        // Consume length prefix
        src.advance(4);

        // Read frame type
        let frame_type = FrameType::try_from(src[0])?;
        src.advance(1);

        // Read payload
        let payload_len = length - 1;
        let payload = src.split_to(payload_len).to_vec();

        Ok(Some(Frame { frame_type, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = 1 + item.payload.len();
        if length > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(length));
        }

        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.put_u8(item.frame_type as u8);
        dst.put_slice(&item.payload);

        Ok(())
    }
}

impl Frame {
    /// Create a new frame
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self { frame_type, payload }
    }
}
