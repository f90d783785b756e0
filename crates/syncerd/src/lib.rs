//! syncerd - StateMesh state synchronization daemon
//!
//! This daemon provides:
//! - Version-aware message store bucketed by learning source
//! - Reporter/receiver plane for local components
//! - Bidirectional peer streams with periodic sync ticks
//! - Leader-side stream acceptance and follower-side leader link
//! - Built-in cluster membership component

pub mod config;
pub mod membership;
pub mod reactor;
pub mod registry;
pub mod server;
pub mod store;
pub mod syncer;

pub use config::Config;
pub use membership::ClusterMembership;
pub use reactor::PeerReactor;
pub use registry::{ComponentRegistry, Receiver, Reporter};
pub use server::Server;
pub use store::{ClusterView, IngestOutcome};
pub use syncer::Syncer;
