use std::env;
use std::fs;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_std::task;
use tracing::{info, warn};

use nat_probe::{NatType, NetworkConfig, STUNError, Session};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("network.json"));
    let data = fs::read_to_string(&config_path)
        .with_context(|| format!("cannot read config file {}", config_path))?;
    let config = NetworkConfig::from_json(&data)
        .with_context(|| format!("invalid config file {}", config_path))?;
    let local_addr = config.stun.local_addr().context("invalid local address")?;

    let nat_type = task::block_on(discover(local_addr, &config.stun.server_endpoints()))?;
    println!("nat type: {}", nat_type);
    Ok(())
}

/// Tries each configured server in order and accepts the first non-blocked
/// classification. A server that cannot be reached or answers with a
/// malformed datagram is skipped; a local bind failure is fatal.
async fn discover(local_addr: SocketAddr, servers: &[String]) -> Result<NatType, STUNError> {
    for server in servers {
        let session = match Session::connect(local_addr, server).await {
            Ok(session) => session,
            Err(e @ STUNError::Bind { .. }) => return Err(e),
            Err(e) => {
                warn!(server = %server, error = %e, "cannot open session");
                continue;
            }
        };

        match session.classify().await {
            Ok(NatType::Blocked) => {
                info!(server = %server, "classified as blocked, trying next server");
            }
            Ok(nat_type) => {
                info!(server = %server, %nat_type, "classification complete");
                return Ok(nat_type);
            }
            Err(e) => {
                warn!(server = %server, error = %e, "classification failed");
            }
        }
    }

    Ok(NatType::Blocked)
}
