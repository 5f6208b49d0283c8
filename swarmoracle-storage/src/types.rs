//! Core entity types and the evidence snapshot for the SwarmOracle store.
//!
//! These are plain value types: once a snapshot is loaded, all downstream
//! consensus computation is pure over it. Relationships between entities are
//! represented by id keys plus lookup maps built once at load time; there are
//! no lazy references or runtime pointer cycles.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a question under consensus.
pub type QuestionId = Uuid;

/// Unique identifier for a scoring agent.
pub type AgentId = Uuid;

/// Unique identifier for a submitted answer.
pub type AnswerId = Uuid;

/// Unique identifier for a stake placed on an answer.
pub type StakeId = Uuid;

/// Unique identifier for a debate round.
pub type DebateRoundId = Uuid;

/// Unique identifier for a critique within a debate round.
pub type CritiqueId = Uuid;

/// Category of a question, used by the algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionCategory {
    Factual,
    Predictive,
    Analytical,
    Technical,
    Creative,
}

/// Lifecycle status of a question.
///
/// Transitions are monotonic along `Open → Debating → Consensus → Verified`;
/// `Closed` is reachable from any non-terminal state. The consensus engine
/// only ever advances a question to `Consensus`; `Verified` and `Closed` are
/// set by external workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Open,
    Debating,
    Consensus,
    Verified,
    Closed,
}

impl QuestionStatus {
    /// Position along the monotonic lifecycle, used for regression checks.
    fn order(self) -> u8 {
        match self {
            QuestionStatus::Open => 0,
            QuestionStatus::Debating => 1,
            QuestionStatus::Consensus => 2,
            QuestionStatus::Verified => 3,
            QuestionStatus::Closed => 4,
        }
    }

    /// Whether a transition from `self` to `to` is a legal forward move.
    pub fn can_advance_to(self, to: QuestionStatus) -> bool {
        match (self, to) {
            // Closed is terminal; nothing leaves it.
            (QuestionStatus::Closed, _) => false,
            // Closing is allowed from any non-terminal state.
            (_, QuestionStatus::Closed) => true,
            (from, to) => from.order() < to.order(),
        }
    }
}

/// A question posed to the swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub content: String,
    pub category: QuestionCategory,
    pub status: QuestionStatus,
    /// Minimum number of answers required before consensus may run.
    pub min_answers: usize,
    /// Consensus strength required to declare consensus, in `[0, 1]`.
    pub consensus_threshold: f64,
    /// Optional deadline after which the question stops accepting answers.
    pub open_until: Option<DateTime<Utc>>,
    /// Set exactly once, when the question first reaches `Consensus`.
    pub consensus_reached_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An autonomous scoring agent and its rolling statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Non-negative reputation accumulated across settled questions.
    pub reputation_score: f64,
    /// Rolling accuracy in `[0, 1]`.
    pub accuracy_rate: f64,
    /// Total answers ever submitted by this agent.
    pub total_answers: u64,
    /// Capability tags advertised by the agent.
    pub capabilities: Vec<String>,
}

/// An agent's answer to a question.
///
/// Unique on the `(question_id, agent_id)` fingerprint: one answer per agent
/// per question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub agent_id: AgentId,
    pub content: String,
    pub reasoning: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Final weight from the most recent consensus run, if any.
    pub final_weight: Option<f64>,
    /// Dense 1-based rank from the most recent consensus run, if any.
    pub consensus_rank: Option<u32>,
    pub submitted_at: DateTime<Utc>,
}

/// Settlement status of a stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakeStatus {
    Active,
    Won,
    Lost,
}

/// Tokens staked by an agent on an answer. Only `Active` stakes count
/// toward the stake weight vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stake {
    pub id: StakeId,
    pub answer_id: AnswerId,
    pub agent_id: AgentId,
    /// Strictly positive stake amount.
    pub amount: f64,
    pub status: StakeStatus,
    pub placed_at: DateTime<Utc>,
}

/// A debate round for a question; unique per `(question_id, round_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRound {
    pub id: DebateRoundId,
    pub question_id: QuestionId,
    pub round_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Kind of critique raised against an answer during debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CritiqueKind {
    FactualError,
    LogicalFlaw,
    MissingContext,
    Improvement,
}

/// A critique of an answer raised in a debate round.
///
/// An agent may not critique its own answer; the store rejects such rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    pub id: CritiqueId,
    pub debate_round_id: DebateRoundId,
    pub critic_agent_id: AgentId,
    pub target_answer_id: AnswerId,
    pub kind: CritiqueKind,
    /// Critique impact in `[0, 1]`, scaling the weight adjustment.
    pub impact: f64,
    pub created_at: DateTime<Utc>,
}

/// Current ranked weight of one answer; fully replaced on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusWeight {
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
    pub agent_id: AgentId,
    pub final_weight: f64,
    /// Dense rank starting at 1, descending by weight.
    pub rank: u32,
}

/// Append-only audit record of a single consensus run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusLog {
    pub id: Uuid,
    pub question_id: QuestionId,
    pub algorithm: String,
    pub participant_count: usize,
    pub confidence_level: f64,
    pub winning_answer_id: Option<AnswerId>,
    pub consensus_strength: f64,
    pub calculation_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// One answer joined with its authoring agent and the stakes placed on it.
#[derive(Debug, Clone)]
pub struct AnswerView {
    pub answer: Answer,
    pub agent: Agent,
    pub stakes: Vec<Stake>,
}

/// One debate round with its critiques in `created_at` ascending order.
#[derive(Debug, Clone)]
pub struct DebateRoundView {
    pub round: DebateRound,
    pub critiques: Vec<Critique>,
}

/// Immutable in-memory projection of everything required to score a question.
///
/// Answers are ordered by submission time ascending (ties by answer id), which
/// downstream ranking relies on for deterministic tie-breaking. Debate rounds
/// are ordered by round number descending, newest first.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub question: Question,
    pub answers: Vec<AnswerView>,
    pub debate_rounds: Vec<DebateRoundView>,
    index_by_answer: HashMap<AnswerId, usize>,
}

impl Snapshot {
    pub fn new(
        question: Question,
        mut answers: Vec<AnswerView>,
        mut debate_rounds: Vec<DebateRoundView>,
    ) -> Self {
        answers.sort_by(|a, b| {
            a.answer
                .submitted_at
                .cmp(&b.answer.submitted_at)
                .then(a.answer.id.cmp(&b.answer.id))
        });
        debate_rounds.sort_by(|a, b| b.round.round_number.cmp(&a.round.round_number));
        for view in debate_rounds.iter_mut() {
            view.critiques.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        let index_by_answer = answers
            .iter()
            .enumerate()
            .map(|(idx, view)| (view.answer.id, idx))
            .collect();
        Self {
            question,
            answers,
            debate_rounds,
            index_by_answer,
        }
    }

    /// Number of participants (answers, not agents).
    pub fn participant_count(&self) -> usize {
        self.answers.len()
    }

    /// Position of an answer in the canonical submission ordering.
    pub fn answer_index(&self, answer_id: AnswerId) -> Option<usize> {
        self.index_by_answer.get(&answer_id).copied()
    }

    /// All critiques targeting the given answer, `created_at` ascending.
    pub fn critiques_for(&self, answer_id: AnswerId) -> Vec<&Critique> {
        let mut critiques: Vec<&Critique> = self
            .debate_rounds
            .iter()
            .flat_map(|view| view.critiques.iter())
            .filter(|c| c.target_answer_id == answer_id)
            .collect();
        critiques.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        critiques
    }
}

/// Joined answer/agent summary returned alongside consensus results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSummary {
    pub answer_id: AnswerId,
    pub agent_id: AgentId,
    pub agent_name: String,
    pub agent_reputation: f64,
    pub content: String,
    pub confidence: f64,
    pub final_weight: Option<f64>,
    pub consensus_rank: Option<u32>,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(QuestionStatus::Open.can_advance_to(QuestionStatus::Debating));
        assert!(QuestionStatus::Open.can_advance_to(QuestionStatus::Consensus));
        assert!(QuestionStatus::Debating.can_advance_to(QuestionStatus::Consensus));
        assert!(QuestionStatus::Consensus.can_advance_to(QuestionStatus::Verified));
        assert!(!QuestionStatus::Consensus.can_advance_to(QuestionStatus::Debating));
        assert!(!QuestionStatus::Verified.can_advance_to(QuestionStatus::Consensus));
    }

    #[test]
    fn closed_is_terminal_but_reachable() {
        assert!(QuestionStatus::Open.can_advance_to(QuestionStatus::Closed));
        assert!(QuestionStatus::Verified.can_advance_to(QuestionStatus::Closed));
        assert!(!QuestionStatus::Closed.can_advance_to(QuestionStatus::Open));
        assert!(!QuestionStatus::Closed.can_advance_to(QuestionStatus::Consensus));
    }
}
