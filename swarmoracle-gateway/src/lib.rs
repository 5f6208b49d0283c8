//! # SwarmOracle Fan-Out Gateway
//!
//! Real-time delivery of swarm events to thousands of concurrent
//! subscribers over long-lived WebSocket connections. Subscribers join
//! rooms (`question:{id}`, `agent:{id}`, `leaderboard`, `global`); the
//! gateway bridges the `swarm:events` bus into those rooms with two
//! delivery classes:
//!
//! - **Batched**: non-critical updates coalesce for 100 ms per
//!   `(room, update type)` with latest-wins dedup per entity key, then ship
//!   as one `batch_update`.
//! - **Immediate**: consensus outcomes and permanent failures bypass the
//!   window and go straight to the question room and `global`.
//!
//! Binding an `agent:{id}` room requires a verified credential whose
//! subject equals the id. Liveness is tracked per connection: heartbeat
//! pings go out periodically and subscribers silent past the stale TTL are
//! evicted. Connection, room, and throughput counters are exposed on
//! `/stats`.

mod batcher;
mod bridge;
mod config;
mod connection;
mod protocol;
mod server;

pub use batcher::UpdateBatcher;
pub use bridge::{route_event, run_bridge};
pub use config::GatewayConfig;
pub use connection::{
    AgentAuthenticator, ConnectionId, ConnectionManager, GatewayStats, SubjectTokenAuthenticator,
};
pub use protocol::{ClientMessage, Room, ServerMessage, UpdateType};
pub use server::FanoutGateway;
