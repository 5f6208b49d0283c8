// SwarmOracle Configuration Management
//
// Root configuration for every subsystem of the consensus service. Each
// subsystem crate defines and defaults its own section; this module
// aggregates them, loads overrides from `config.json`, and persists the
// effective configuration on first run so deployments start from a visible,
// editable file.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use swarmoracle_consensus::ConsensusConfig;
use swarmoracle_embedding::EmbeddingConfig;
use swarmoracle_queue::QueueConfig;
use swarmoracle_storage::StorageConfig;

/// Default location of the configuration file.
const CONFIG_PATH: &str = "config.json";

/// Root configuration for the whole SwarmOracle service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Service identity and process-level settings.
    pub node: NodeConfig,

    /// Storage backend selection.
    pub storage: StorageConfig,

    /// Consensus engine timeouts and settlement behavior.
    pub consensus: ConsensusConfig,

    /// Job queue sizing, retry, and retention policy.
    pub queue: QueueConfig,

    /// Embedding provider selection and endpoints.
    pub embedding: EmbeddingConfig,

    /// Fan-out gateway binding, batching, and liveness settings.
    pub gateway: FanoutConfig,
}

/// Identity and process-level settings for this service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable identifier for this instance, used in logs.
    pub node_id: String,

    /// Human-readable deployment name.
    pub deployment: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            deployment: "local".to_string(),
        }
    }
}

/// Settings for the real-time fan-out gateway.
///
/// The gateway crate consumes these through its own config type; this
/// section is the serialized source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub enabled: bool,

    /// Bind address for the WebSocket server.
    pub bind_address: String,
    pub port: u16,

    /// Coalescing window for non-critical updates per `(room, update type)`.
    pub batch_window: Duration,

    /// Interval between server heartbeat pings.
    pub heartbeat_interval: Duration,

    /// Connections silent for longer than this are evicted.
    pub stale_ttl: Duration,

    pub cors_enabled: bool,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 8090,
            batch_window: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(30),
            stale_ttl: Duration::from_secs(300),
            cors_enabled: true,
        }
    }
}

impl SwarmConfig {
    /// Load configuration from `config.json`, falling back to defaults.
    /// The defaults are persisted on first run so the effective settings are
    /// inspectable on disk.
    pub async fn load() -> Result<Self> {
        match tokio::fs::read_to_string(CONFIG_PATH).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("failed to parse {CONFIG_PATH}: {e}")),
            Err(_) => {
                let config = Self::default();
                config.save().await?;
                Ok(config)
            }
        }
    }

    /// Persist the current configuration as pretty-printed JSON.
    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(CONFIG_PATH, content).await?;
        Ok(())
    }
}
