//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use swarmoracle_core::FanoutConfig;

/// Settings the fan-out gateway runs with. The serialized source of truth is
/// the `gateway` section of the root configuration; this type is the
/// gateway-side view of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub port: u16,

    /// Coalescing window for non-critical updates per `(room, update type)`.
    pub batch_window: Duration,

    /// Interval between heartbeat pings to subscribers.
    pub heartbeat_interval: Duration,

    /// Subscribers silent past this TTL are evicted.
    pub stale_ttl: Duration,

    pub cors_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_fanout(&FanoutConfig::default())
    }
}

impl GatewayConfig {
    pub fn from_fanout(config: &FanoutConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            batch_window: config.batch_window,
            heartbeat_interval: config.heartbeat_interval,
            stale_ttl: config.stale_ttl,
            cors_enabled: config.cors_enabled,
        }
    }
}
