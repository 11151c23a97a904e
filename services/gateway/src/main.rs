//! Handshake-routing TCP gateway.
//!
//! This service:
//! - Loads a listen address and domain-to-backend mapping from the environment
//! - Accepts TCP connections and parses the first handshake packet
//! - Routes each connection by the domain the client declared
//! - Replays the handshake bytes to the backend and splices both sockets

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mc_gateway::config::Config;
use mc_gateway::Gateway;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fall back to LOG_LEVEL)
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if config.listen_addr_defaulted {
        info!(
            listen_addr = %config.listen_addr,
            "PROXY_LISTEN_ADDR is not set, using default"
        );
    }
    info!(
        listen_addr = %config.listen_addr,
        route_count = config.mapping.servers.len(),
        has_default = config.mapping.default.is_some(),
        "Configuration loaded"
    );

    let gateway = Gateway::bind(&config.listen_addr, config.mapping).await?;

    // Blocks until the listener fails; per-session failures never
    // propagate here.
    Arc::new(gateway).run().await?;
    Ok(())
}
