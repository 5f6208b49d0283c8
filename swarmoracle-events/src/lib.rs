//! # SwarmOracle Event Bus
//!
//! Cross-component pub/sub for the single logical topic `swarm:events`. The
//! consensus engine publishes here after commits, the fan-out gateway
//! subscribes, and any other process-local component may attach a receiver.
//!
//! Delivery is fire-and-forget with at-most-once semantics: a publish with no
//! live subscribers is dropped, and a lagging subscriber loses the oldest
//! messages in its backlog. There are no ordering guarantees across message
//! types; the engine itself guarantees that `consensus:calculated` for a run
//! is published only after its commit completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// The single logical topic all swarm events travel on.
pub const SWARM_EVENTS_TOPIC: &str = "swarm:events";

/// Default buffer capacity per subscriber before lagging sets in.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A leaderboard row carried by `leaderboard:updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub reputation_score: f64,
    pub accuracy_rate: f64,
}

/// Typed messages carried on the `swarm:events` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SwarmEvent {
    #[serde(rename = "answer:submitted")]
    AnswerSubmitted {
        question_id: Uuid,
        answer_id: Uuid,
        agent_id: Uuid,
        confidence: f64,
    },

    #[serde(rename = "question:created")]
    QuestionCreated {
        question_id: Uuid,
        category: String,
        min_answers: usize,
    },

    /// Published strictly after the run's commit transaction completes.
    #[serde(rename = "consensus:calculated")]
    ConsensusCalculated {
        question_id: Uuid,
        algorithm: String,
        winning_answer_id: Option<Uuid>,
        consensus_strength: f64,
        confidence_level: f64,
        participant_count: usize,
        consensus_reached: bool,
    },

    #[serde(rename = "consensus:failed")]
    ConsensusFailed {
        question_id: Uuid,
        /// Opaque but stable per error kind.
        reason: String,
        /// Whether the failure terminated the job for good.
        permanent: bool,
    },

    #[serde(rename = "agent:reputation:updated")]
    AgentReputationUpdated {
        agent_id: Uuid,
        reputation_score: f64,
        accuracy_rate: f64,
    },

    #[serde(rename = "leaderboard:updated")]
    LeaderboardUpdated { entries: Vec<LeaderboardEntry> },
}

impl SwarmEvent {
    /// Question the event concerns, when it concerns one.
    pub fn question_id(&self) -> Option<Uuid> {
        match self {
            SwarmEvent::AnswerSubmitted { question_id, .. }
            | SwarmEvent::QuestionCreated { question_id, .. }
            | SwarmEvent::ConsensusCalculated { question_id, .. }
            | SwarmEvent::ConsensusFailed { question_id, .. } => Some(*question_id),
            _ => None,
        }
    }
}

/// A published event together with its topic and publication time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub event: SwarmEvent,
    pub published_at: DateTime<Utc>,
}

/// Process-local pub/sub bus over a broadcast channel.
///
/// Cloning the bus is cheap and every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event on `swarm:events`. Best-effort: when no subscriber
    /// is attached the event is dropped.
    pub fn publish(&self, event: SwarmEvent) {
        let envelope = EventEnvelope {
            topic: SWARM_EVENTS_TOPIC.to_string(),
            event,
            published_at: Utc::now(),
        };
        match self.sender.send(envelope) {
            Ok(receivers) => debug!(receivers, "published swarm event"),
            Err(_) => debug!("dropped swarm event, no subscribers attached"),
        }
    }

    /// Attach a new subscriber to the topic.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
