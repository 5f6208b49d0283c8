//! Connection and room management for the fan-out gateway.
//!
//! Per-connection state (outbound channel, identity, joined rooms, liveness)
//! lives in one concurrent map; a reverse index `room → connections` makes
//! room sends O(occupants). Binding an `agent:{id}` room requires a verified
//! credential whose subject equals the id.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use swarmoracle_storage::AgentId;

use crate::protocol::{Room, ServerMessage};

pub type ConnectionId = Uuid;

/// Verifies subscriber credentials for agent-room binds.
///
/// Token minting is out of scope; the gateway only needs the verified
/// subject.
pub trait AgentAuthenticator: Send + Sync {
    fn verify(&self, token: &str) -> Option<AgentId>;
}

/// Development authenticator accepting `agent:<uuid>` bearer tokens.
#[derive(Debug, Default)]
pub struct SubjectTokenAuthenticator;

impl AgentAuthenticator for SubjectTokenAuthenticator {
    fn verify(&self, token: &str) -> Option<AgentId> {
        token
            .strip_prefix("agent:")
            .and_then(|subject| Uuid::parse_str(subject).ok())
    }
}

struct ClientConnection {
    sender: mpsc::UnboundedSender<ServerMessage>,
    agent_id: Option<AgentId>,
    rooms: HashSet<Room>,
    last_seen: Instant,
}

/// Gateway observability counters.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub active_connections: usize,
    pub authenticated_connections: usize,
    pub rooms_occupied: usize,
    pub messages_per_second: f64,
}

/// Owns all subscriber connections and their room memberships.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ClientConnection>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    authenticator: Box<dyn AgentAuthenticator>,
    messages_sent: AtomicU64,
    rate_window: Mutex<(Instant, u64)>,
}

impl ConnectionManager {
    pub fn new(authenticator: Box<dyn AgentAuthenticator>) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            authenticator,
            messages_sent: AtomicU64::new(0),
            rate_window: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Register a new connection and return its id.
    pub fn register(&self, sender: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ClientConnection {
                sender,
                agent_id: None,
                rooms: HashSet::new(),
                last_seen: Instant::now(),
            },
        );
        debug!(connection_id = %id, "subscriber connected");
        id
    }

    /// Drop a connection and its room memberships.
    pub fn unregister(&self, id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&id) {
            for room in connection.rooms {
                if let Some(mut members) = self.rooms.get_mut(&room) {
                    members.remove(&id);
                }
            }
            self.rooms.retain(|_, members| !members.is_empty());
            debug!(connection_id = %id, "subscriber disconnected");
        }
    }

    /// Bind the connection to an agent identity.
    pub fn authenticate(&self, id: ConnectionId, token: &str) -> Result<AgentId, String> {
        let agent_id = self
            .authenticator
            .verify(token)
            .ok_or_else(|| "invalid credential".to_string())?;
        match self.connections.get_mut(&id) {
            Some(mut connection) => {
                connection.agent_id = Some(agent_id);
                connection.last_seen = Instant::now();
                Ok(agent_id)
            }
            None => Err("unknown connection".to_string()),
        }
    }

    /// Identity bound to a connection, if authenticated.
    pub fn agent_of(&self, id: ConnectionId) -> Option<AgentId> {
        self.connections.get(&id).and_then(|c| c.agent_id)
    }

    /// Join a room. Agent rooms demand that the connection's verified
    /// identity matches the room's subject.
    pub fn join_room(&self, id: ConnectionId, room: Room) -> Result<(), String> {
        let mut connection = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| "unknown connection".to_string())?;

        if let Room::Agent(subject) = room {
            match connection.agent_id {
                Some(agent_id) if agent_id == subject => {}
                _ => return Err(format!("agent room {subject} requires a matching credential")),
            }
        }

        connection.rooms.insert(room);
        connection.last_seen = Instant::now();
        drop(connection);

        self.rooms.entry(room).or_default().insert(id);
        debug!(connection_id = %id, room = %room, "joined room");
        Ok(())
    }

    /// Record liveness for a connection.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(mut connection) = self.connections.get_mut(&id) {
            connection.last_seen = Instant::now();
        }
    }

    /// Send to one connection; returns false when it is gone.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(&id) {
            Some(connection) => {
                let delivered = connection.sender.send(message).is_ok();
                if delivered {
                    self.count_message(1);
                }
                delivered
            }
            None => false,
        }
    }

    /// Fan a message out to every member of a room; returns the delivery
    /// count.
    pub fn send_to_room(&self, room: &Room, message: &ServerMessage) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for id in members {
            if let Some(connection) = self.connections.get(&id) {
                if connection.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        self.count_message(delivered as u64);
        delivered
    }

    /// Send to every connection, rooms or not.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        for connection in self.connections.iter() {
            if connection.sender.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        self.count_message(delivered as u64);
        delivered
    }

    /// Evict connections silent for longer than `stale_ttl`; returns the
    /// evicted ids.
    pub fn evict_stale(&self, stale_ttl: Duration) -> Vec<ConnectionId> {
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.last_seen.elapsed() > stale_ttl)
            .map(|entry| *entry.key())
            .collect();

        for id in &stale {
            warn!(connection_id = %id, "evicting stale subscriber");
            self.unregister(*id);
        }
        stale
    }

    pub fn stats(&self) -> GatewayStats {
        let authenticated = self
            .connections
            .iter()
            .filter(|entry| entry.agent_id.is_some())
            .count();

        let messages_per_second = {
            let mut window = self.rate_window.lock();
            let total = self.messages_sent.load(Ordering::Relaxed);
            let elapsed = window.0.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                (total - window.1) as f64 / elapsed
            } else {
                0.0
            };
            // Roll the window once a minute so the rate stays current.
            if elapsed >= 60.0 {
                *window = (Instant::now(), total);
            }
            rate
        };

        GatewayStats {
            active_connections: self.connections.len(),
            authenticated_connections: authenticated,
            rooms_occupied: self.rooms.len(),
            messages_per_second,
        }
    }

    fn count_message(&self, n: u64) {
        self.messages_sent.fetch_add(n, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Box::new(SubjectTokenAuthenticator))
    }

    fn connect(
        manager: &ConnectionManager,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (manager.register(tx), rx)
    }

    #[tokio::test]
    async fn room_sends_reach_only_members() {
        let manager = manager();
        let (a, mut rx_a) = connect(&manager);
        let (_b, mut rx_b) = connect(&manager);

        let room = Room::Leaderboard;
        manager.join_room(a, room).unwrap();

        let delivered = manager.send_to_room(&room, &ServerMessage::Ping);
        assert_eq!(delivered, 1);
        assert!(matches!(rx_a.try_recv(), Ok(ServerMessage::Ping)));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn agent_room_requires_matching_credential() {
        let manager = manager();
        let (id, _rx) = connect(&manager);
        let subject = Uuid::new_v4();

        // Unauthenticated bind is rejected.
        assert!(manager.join_room(id, Room::Agent(subject)).is_err());

        // Authenticated as a different agent: still rejected.
        let other = Uuid::new_v4();
        manager.authenticate(id, &format!("agent:{other}")).unwrap();
        assert!(manager.join_room(id, Room::Agent(subject)).is_err());

        // Matching subject binds.
        manager
            .authenticate(id, &format!("agent:{subject}"))
            .unwrap();
        manager.join_room(id, Room::Agent(subject)).unwrap();
    }

    #[tokio::test]
    async fn bad_tokens_are_rejected() {
        let manager = manager();
        let (id, _rx) = connect(&manager);
        assert!(manager.authenticate(id, "agent:not-a-uuid").is_err());
        assert!(manager.authenticate(id, "bearer nope").is_err());
    }

    #[tokio::test]
    async fn stale_connections_are_evicted() {
        let manager = manager();
        let (a, _rx_a) = connect(&manager);
        let (b, _rx_b) = connect(&manager);
        manager.join_room(a, Room::Global).unwrap();

        // Zero TTL declares everything stale.
        let evicted = manager.evict_stale(Duration::from_secs(0));
        assert_eq!(evicted.len(), 2);
        assert!(evicted.contains(&a) && evicted.contains(&b));

        let stats = manager.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.rooms_occupied, 0);
    }

    #[tokio::test]
    async fn stats_count_authenticated_connections() {
        let manager = manager();
        let (a, _rx_a) = connect(&manager);
        let (_b, _rx_b) = connect(&manager);
        manager
            .authenticate(a, &format!("agent:{}", Uuid::new_v4()))
            .unwrap();

        let stats = manager.stats();
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.authenticated_connections, 1);
    }
}
