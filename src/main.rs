// SwarmOracle - Collective-Intelligence Consensus Service
//
// Main entry point for the SwarmOracle service. Orchestrates the complete
// lifecycle of the consensus pipeline and its real-time fan-out layer:
// - Transactional evidence store (in-memory backend)
// - Consensus engine with four concurrent weight calculators and three
//   voting algorithms
// - Priority job queue with dedup, retries, and a fixed worker pool
// - swarm:events bus connecting the engine to the fan-out gateway
// - WebSocket gateway with room-scoped, batched delivery to subscribers
//
// Shutdown is graceful: the gateway announces server:shutdown to every
// subscriber, in-flight consensus jobs are cancelled, and workers drain.

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};

use swarmoracle_core::SwarmOracle;
use swarmoracle_gateway::{FanoutGateway, GatewayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging with environment-based filtering
    // (RUST_LOG=debug,swarmoracle=trace), defaulting to info for our crates.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swarmoracle=info".parse()?),
        )
        .json()
        .init();

    info!("Starting SwarmOracle consensus service");

    let oracle = match SwarmOracle::new().await {
        Ok(oracle) => Arc::new(oracle),
        Err(e) => {
            error!("Failed to initialize SwarmOracle: {e}");
            return Err(e);
        }
    };
    oracle.start().await?;
    info!("SwarmOracle core started");

    let gateway = if oracle.config().gateway.enabled {
        let config = GatewayConfig::from_fanout(&oracle.config().gateway);
        let gateway = FanoutGateway::new(config, Arc::clone(&oracle));
        gateway.start().await?;
        Some(gateway)
    } else {
        info!("fan-out gateway disabled by configuration");
        None
    };

    // Run until a shutdown signal arrives.
    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping SwarmOracle");

    if let Some(gateway) = &gateway {
        gateway.stop().await?;
    }
    oracle.stop().await?;

    info!("SwarmOracle stopped cleanly");
    Ok(())
}
