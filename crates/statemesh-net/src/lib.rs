//! Wire protocol for StateMesh peer streams
//!
//! This crate provides:
//! - Length-prefixed message framing
//! - The hello handshake envelope carrying the sender's node id
//! - Batch framing helpers for sync messages

pub mod framing;
pub mod wire;

pub use framing::{Frame, FrameCodec, FrameError, FrameType};
pub use wire::Hello;
