//! # SwarmOracle Storage
//!
//! Persistence layer for the SwarmOracle consensus service. This crate owns
//! the entity model (questions, agents, answers, stakes, debate rounds,
//! critiques, consensus weights, and the append-only consensus log), the
//! evidence [`Snapshot`] the engine computes over, and the transactional
//! [`ConsensusStore`] port the engine consumes.
//!
//! ## Contract
//!
//! - **Evidence loads** materialize the complete evidence graph for one
//!   question in a single read-consistent pass; the returned snapshot is a
//!   value with no lazy references.
//! - **Result commits** apply the full write-set of a run atomically:
//!   delete-then-insert of the question's weight rows, answer weight/rank
//!   updates, a conditional (never-downgrading) question status advance, and
//!   exactly one appended audit log row.
//! - **Unique constraints**: `(question_id, agent_id)` on answers and
//!   `(question_id, round_number)` on debate rounds; agents may not critique
//!   their own answers.
//!
//! The bundled [`MemoryStore`] backs tables with concurrent maps behind a
//! single commit lock. It is the production default for single-node
//! deployments and the double of choice in tests.

use serde::{Deserialize, Serialize};

mod memory;
mod store;
mod types;

pub use memory::MemoryStore;
pub use store::{ConsensusStore, ResultCommit, StakeSettlement, StoreError};
pub use types::{
    Agent, AgentId, Answer, AnswerId, AnswerSummary, AnswerView, ConsensusLog, ConsensusWeight,
    Critique, CritiqueId, CritiqueKind, DebateRound, DebateRoundId, DebateRoundView, Question,
    QuestionCategory, QuestionId, QuestionStatus, Snapshot, Stake, StakeId, StakeStatus,
};

/// Configuration for the storage subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selection; only the in-memory backend ships today.
    pub backend: StorageBackend,
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Concurrent in-memory tables; state lives for the process lifetime.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
        }
    }
}
