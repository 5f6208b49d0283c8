//! The store port consumed by the consensus engine.
//!
//! The engine only ever sees this trait; production wires the in-memory
//! store, tests may substitute their own double. The contract is transactional
//! on both sides: evidence loads are read-consistent, result commits are
//! all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Agent, AgentId, Answer, AnswerId, AnswerSummary, ConsensusLog, ConsensusWeight, Critique,
    DebateRound, Question, QuestionId, QuestionStatus, Snapshot, Stake,
};

/// Errors surfaced by store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("answer {0} not found")]
    AnswerNotFound(AnswerId),

    #[error("debate round {0} not found")]
    DebateRoundNotFound(crate::types::DebateRoundId),

    /// Violation of the `(question_id, agent_id)` answer fingerprint.
    #[error("agent {agent_id} already answered question {question_id}")]
    DuplicateAnswer {
        question_id: QuestionId,
        agent_id: AgentId,
    },

    /// Violation of the `(question_id, round_number)` uniqueness constraint.
    #[error("debate round {round_number} already exists for question {question_id}")]
    DuplicateDebateRound {
        question_id: QuestionId,
        round_number: u32,
    },

    #[error("agent {0} may not critique its own answer")]
    SelfCritique(AgentId),

    #[error("stake amount must be positive, got {0}")]
    NonPositiveStake(f64),

    /// Status regression attempted at commit; the whole commit aborts.
    #[error("question {question_id} cannot move from {from:?} to {to:?}")]
    StatusConflict {
        question_id: QuestionId,
        from: QuestionStatus,
        to: QuestionStatus,
    },

    /// Backend failure; callers treat this as transient.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The complete write-set of one successful consensus run.
///
/// Applied atomically: replace the question's `ConsensusWeight` rows, write
/// each answer's final weight and rank, conditionally advance the question to
/// `Consensus`, and append exactly one `ConsensusLog` row.
#[derive(Debug, Clone)]
pub struct ResultCommit {
    pub question_id: QuestionId,
    /// Ranked weight rows for every answer of the question, rank ascending.
    pub weights: Vec<ConsensusWeight>,
    pub consensus_reached: bool,
    /// Wall-clock commit time, used for `consensus_reached_at`.
    pub committed_at: DateTime<Utc>,
    pub log: ConsensusLog,
}

/// Result of settling stakes after a consensus run.
#[derive(Debug, Clone, Default)]
pub struct StakeSettlement {
    pub won: Vec<Stake>,
    pub lost: Vec<Stake>,
}

/// Transactional store port for consensus evidence and results.
#[async_trait]
pub trait ConsensusStore: Send + Sync {
    /// Materialize the full evidence graph for a question in one
    /// read-consistent pass: question, answers with authoring agents,
    /// stakes per answer, and debate rounds with nested critiques.
    async fn load_evidence(&self, question_id: QuestionId) -> Result<Snapshot, StoreError>;

    /// Apply the write-set of a successful run; all-or-nothing.
    async fn commit_result(&self, commit: ResultCommit) -> Result<(), StoreError>;

    async fn question(&self, question_id: QuestionId) -> Result<Question, StoreError>;

    /// Most recent audit log row for a question, if any run ever committed.
    async fn latest_log(&self, question_id: QuestionId)
        -> Result<Option<ConsensusLog>, StoreError>;

    /// Current ranked weight rows, rank ascending.
    async fn ranked_weights(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<ConsensusWeight>, StoreError>;

    /// Joined answer/agent summaries in submission order.
    async fn answer_summaries(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerSummary>, StoreError>;

    async fn answer_count(&self, question_id: QuestionId) -> Result<usize, StoreError>;

    async fn insert_question(&self, question: Question) -> Result<(), StoreError>;

    async fn insert_agent(&self, agent: Agent) -> Result<(), StoreError>;

    async fn agent(&self, agent_id: AgentId) -> Result<Agent, StoreError>;

    /// Insert an answer, enforcing the `(question_id, agent_id)` fingerprint
    /// and bumping the agent's total answer count.
    async fn insert_answer(&self, answer: Answer) -> Result<(), StoreError>;

    async fn insert_stake(&self, stake: Stake) -> Result<(), StoreError>;

    /// Open a debate round, enforcing `(question_id, round_number)`
    /// uniqueness.
    async fn open_debate_round(&self, round: DebateRound) -> Result<(), StoreError>;

    /// Record a critique. Rejects self-critique; the first critique against
    /// an `Open` question moves it to `Debating`.
    async fn insert_critique(&self, critique: Critique) -> Result<(), StoreError>;

    /// Settle all `Active` stakes on a question's answers: stakes on the
    /// winning answer become `Won`, the rest `Lost`.
    async fn settle_stakes(
        &self,
        question_id: QuestionId,
        winning_answer_id: AnswerId,
    ) -> Result<StakeSettlement, StoreError>;

    /// Apply a settlement outcome to an agent's rolling statistics and
    /// return the updated row. Reputation never drops below zero.
    async fn apply_agent_outcome(
        &self,
        agent_id: AgentId,
        won: bool,
        reputation_delta: f64,
    ) -> Result<Agent, StoreError>;
}

impl StoreError {
    /// Whether retrying the operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
