//! Configuration for syncerd

use clap::Parser;
use std::net::SocketAddr;

/// syncerd - StateMesh state synchronization daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "syncerd")]
#[command(about = "StateMesh cluster state synchronization daemon")]
pub struct Config {
    /// Node identifier, unique within the cluster
    #[arg(long, env = "STATEMESH_NODE_ID")]
    pub node_id: String,

    /// Listen address for follower streams (leader role)
    #[arg(short, long, default_value = "0.0.0.0:9400")]
    pub listen: SocketAddr,

    /// Leader address to follow; when absent this process is the leader
    #[arg(long, env = "STATEMESH_LEADER")]
    pub leader: Option<SocketAddr>,

    /// Sync tick interval in milliseconds
    #[arg(long, default_value = "100")]
    pub tick_interval_ms: u64,

    /// Backoff between leader reconnect attempts, in milliseconds
    #[arg(long, default_value = "1000")]
    pub reconnect_backoff_ms: u64,

    /// Address advertised to the cluster by the membership component
    #[arg(long)]
    pub advertise: Option<SocketAddr>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.is_empty() {
            anyhow::bail!("Node id cannot be empty");
        }
        if self.tick_interval_ms == 0 {
            anyhow::bail!("Tick interval must be at least 1 ms");
        }
        if let Some(leader) = self.leader {
            if leader == self.listen {
                anyhow::bail!("Leader address must differ from the listen address");
            }
        }
        Ok(())
    }
}
