//! Wire protocol of the fan-out gateway: rooms and the JSON messages
//! exchanged with subscribers over the long-lived connection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use swarmoracle_events::LeaderboardEntry;
use swarmoracle_storage::{AgentId, AnswerId, QuestionId};

/// A logical topic a subscriber may join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Question(QuestionId),
    /// Requires an authenticated credential whose subject is the agent.
    Agent(AgentId),
    Leaderboard,
    Global,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Question(id) => write!(f, "question:{id}"),
            Room::Agent(id) => write!(f, "agent:{id}"),
            Room::Leaderboard => f.write_str("leaderboard"),
            Room::Global => f.write_str("global"),
        }
    }
}

impl FromStr for Room {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leaderboard" => return Ok(Room::Leaderboard),
            "global" => return Ok(Room::Global),
            _ => {}
        }
        if let Some(id) = s.strip_prefix("question:") {
            let id = Uuid::parse_str(id).map_err(|e| format!("bad question room: {e}"))?;
            return Ok(Room::Question(id));
        }
        if let Some(id) = s.strip_prefix("agent:") {
            let id = Uuid::parse_str(id).map_err(|e| format!("bad agent room: {e}"))?;
            return Ok(Room::Agent(id));
        }
        Err(format!("unknown room: {s}"))
    }
}

impl Serialize for Room {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Category of a batched update; batching windows are keyed per
/// `(room, update type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    AnswerSubmitted,
    QuestionNew,
    ReputationUpdated,
    LeaderboardUpdated,
}

/// Messages a subscriber sends to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Bind this connection to an agent identity.
    #[serde(rename = "auth:agent")]
    AuthAgent { token: String },

    #[serde(rename = "subscribe:question")]
    SubscribeQuestion { question_id: QuestionId },

    #[serde(rename = "subscribe:agent")]
    SubscribeAgent { agent_id: AgentId },

    #[serde(rename = "subscribe:leaderboard")]
    SubscribeLeaderboard,

    #[serde(rename = "subscribe:global")]
    SubscribeGlobal,

    /// Client-to-server answer passthrough; requires authentication.
    #[serde(rename = "answer:submit")]
    AnswerSubmit {
        question_id: QuestionId,
        content: String,
        reasoning: String,
        confidence: f64,
    },

    #[serde(rename = "pong")]
    Pong,
}

/// Messages the gateway sends to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "auth:success")]
    AuthSuccess { agent_id: AgentId },

    #[serde(rename = "auth:failed")]
    AuthFailed { reason: String },

    #[serde(rename = "answer:submitted")]
    AnswerSubmitted {
        question_id: QuestionId,
        answer_id: AnswerId,
        agent_id: AgentId,
        confidence: f64,
    },

    /// Consensus outcome notification; bypasses batching.
    #[serde(rename = "consensus:reached")]
    ConsensusReached {
        question_id: QuestionId,
        winning_answer_id: Option<AnswerId>,
        algorithm: String,
        consensus_strength: f64,
        confidence_level: f64,
        participant_count: usize,
        consensus_reached: bool,
    },

    /// Failure notification; bypasses batching.
    #[serde(rename = "consensus:failed")]
    ConsensusFailed {
        question_id: QuestionId,
        reason: String,
    },

    #[serde(rename = "question:new")]
    QuestionNew {
        question_id: QuestionId,
        category: String,
        min_answers: usize,
    },

    #[serde(rename = "reputation:updated")]
    ReputationUpdated {
        agent_id: AgentId,
        reputation_score: f64,
        accuracy_rate: f64,
    },

    #[serde(rename = "leaderboard:updated")]
    LeaderboardUpdated { entries: Vec<LeaderboardEntry> },

    /// Coalesced non-critical updates for one `(room, update type)` window;
    /// items are deduplicated latest-wins per entity key.
    #[serde(rename = "batch_update")]
    BatchUpdate {
        room: Room,
        update_type: UpdateType,
        items: Vec<serde_json::Value>,
    },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "server:shutdown")]
    ServerShutdown,

    #[serde(rename = "error")]
    Error { reason: String },
}
