//! syncerd - StateMesh state synchronization daemon
//!
//! Hosts one syncer engine per process. Without a leader address the
//! process is the cluster leader and accepts follower streams; with one
//! it follows that leader, re-dialing on link loss.

use clap::Parser;
use statemesh_core::{ComponentId, NodeId};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use syncerd::config::Config;
use syncerd::membership::ClusterMembership;
use syncerd::server::Server;
use syncerd::syncer::Syncer;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging
    let default_level = if config.verbose {
        "syncerd=debug"
    } else {
        "syncerd=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()))
        .init();

    if let Err(error) = config.validate() {
        error!("Invalid configuration: {}", error);
        return ExitCode::FAILURE;
    }

    info!(
        "syncerd v{} - StateMesh Sync Daemon",
        env!("CARGO_PKG_VERSION")
    );

    let node_id = NodeId::from(config.node_id.clone());
    let syncer = Arc::new(Syncer::new(
        node_id.clone(),
        Duration::from_millis(config.tick_interval_ms),
    ));

    // Leaders advertise their listen address unless told otherwise
    let advertise = config
        .advertise
        .or_else(|| config.leader.is_none().then_some(config.listen));
    let membership = Arc::new(ClusterMembership::new(node_id, advertise));
    syncer.register(
        ComponentId::Membership,
        Some(membership.clone()),
        Some(membership.clone()),
    );

    match config.leader {
        None => {
            let server = match Server::bind(config.listen, syncer.clone()).await {
                Ok(server) => server,
                Err(error) => {
                    error!("Failed to bind {}: {}", config.listen, error);
                    return ExitCode::FAILURE;
                }
            };

            tokio::select! {
                result = server.run() => {
                    if let Err(error) = result {
                        error!("Server error: {}", error);
                        return ExitCode::FAILURE;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    syncer.shutdown();
                }
            }
        }
        Some(leader_addr) => {
            let backoff = Duration::from_millis(config.reconnect_backoff_ms);
            tokio::select! {
                _ = follow_leader(syncer.clone(), leader_addr, backoff) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    syncer.shutdown();
                }
            }
        }
    }

    ExitCode::SUCCESS
}

/// Keep the leader link alive, re-dialing with a fixed backoff
async fn follow_leader(syncer: Arc<Syncer>, leader_addr: SocketAddr, backoff: Duration) {
    loop {
        match syncer.clone().follow(leader_addr).await {
            Ok(leader_id) => {
                while syncer.has_peer(&leader_id) {
                    sleep(backoff).await;
                }
                warn!(leader = %leader_id, "Leader link lost; reconnecting");
            }
            Err(error) => {
                warn!("Failed to reach leader at {}: {}", leader_addr, error);
            }
        }
        sleep(backoff).await;
    }
}
