//! # SwarmOracle Core - Consensus Service Orchestration
//!
//! Central coordination for the SwarmOracle collective-intelligence
//! consensus service. This crate wires the subsystem crates together and
//! manages their lifecycle:
//!
//! - **Storage**: the transactional evidence store (in-memory backend)
//! - **Event bus**: the `swarm:events` pub/sub topic
//! - **Embedding**: the batched text-embedding port with a local fallback
//! - **Consensus engine**: evidence loading, weight calculation, voting,
//!   and atomic result commits
//! - **Job queue**: priority scheduling, dedup, retries, and the worker pool
//!
//! The [`SwarmOracle`] struct is the single entry point the transport layer
//! (HTTP/WS, out of scope here) talks to: triggering consensus runs, reading
//! results and status, and the write passthroughs that feed evidence into
//! the store while publishing the matching swarm events.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use swarmoracle_consensus::ConsensusEngine;
use swarmoracle_embedding::{
    EmbeddingProvider, EmbeddingProviderKind, HashingEmbeddingProvider, HttpEmbeddingProvider,
};
use swarmoracle_events::{EventBus, SwarmEvent};
use swarmoracle_queue::{CalculationStatus, ConsensusScheduler, TriggerOptions, TriggerReceipt};
use swarmoracle_storage::{
    Agent, Answer, AnswerId, AnswerSummary, ConsensusLog, ConsensusStore, ConsensusWeight,
    Critique, CritiqueKind, DebateRound, MemoryStore, Question, QuestionCategory, QuestionId,
    QuestionStatus, Stake, StakeStatus,
};

mod config;

pub use config::{FanoutConfig, NodeConfig, SwarmConfig};

/// Latest consensus outcome for a question: the newest audit log row, the
/// current ranked weights, and joined answer/agent summaries.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusReport {
    pub log: Option<ConsensusLog>,
    pub weights: Vec<ConsensusWeight>,
    pub answers: Vec<AnswerSummary>,
}

/// Combined calculation and question status for one question.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub calculation: CalculationStatus,
    pub question_status: QuestionStatus,
    pub answer_count: usize,
    pub consensus_reached_at: Option<DateTime<Utc>>,
    pub has_consensus: bool,
    /// Evidence progress toward the minimum answer count, 0.0 to 1.0.
    pub progress: f64,
}

/// Inputs for creating a question.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDraft {
    pub content: String,
    pub category: QuestionCategory,
    pub min_answers: usize,
    pub consensus_threshold: f64,
    pub open_until: Option<DateTime<Utc>>,
}

/// Inputs for registering a scoring agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    pub capabilities: Vec<String>,
}

/// Inputs for submitting an answer.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerDraft {
    pub question_id: QuestionId,
    pub agent_id: Uuid,
    pub content: String,
    pub reasoning: String,
    pub confidence: f64,
}

/// Inputs for placing a stake on an answer.
#[derive(Debug, Clone, Deserialize)]
pub struct StakeDraft {
    pub answer_id: AnswerId,
    pub agent_id: Uuid,
    pub amount: f64,
}

/// Inputs for raising a critique in a debate round.
#[derive(Debug, Clone, Deserialize)]
pub struct CritiqueDraft {
    pub debate_round_id: Uuid,
    pub critic_agent_id: Uuid,
    pub target_answer_id: AnswerId,
    pub kind: CritiqueKind,
    pub impact: f64,
}

/// The assembled SwarmOracle service instance.
pub struct SwarmOracle {
    config: SwarmConfig,
    store: Arc<MemoryStore>,
    bus: EventBus,
    scheduler: ConsensusScheduler,
}

impl SwarmOracle {
    /// Create an instance from `config.json` (or persisted defaults).
    pub async fn new() -> Result<Self> {
        let config = SwarmConfig::load().await?;
        Self::new_with_config(config).await
    }

    /// Create an instance from a pre-built configuration. Used by tests and
    /// embedded deployments.
    pub async fn new_with_config(config: SwarmConfig) -> Result<Self> {
        info!(node_id = %config.node.node_id, "initializing SwarmOracle core");

        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new();

        let embedding: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            EmbeddingProviderKind::Http => {
                Arc::new(HttpEmbeddingProvider::new(&config.embedding)?)
            }
            EmbeddingProviderKind::Hashing => {
                Arc::new(HashingEmbeddingProvider::new(config.embedding.dimension))
            }
        };

        let engine = Arc::new(ConsensusEngine::new(
            config.consensus.clone(),
            Arc::clone(&store) as Arc<dyn ConsensusStore>,
            embedding,
            bus.clone(),
        ));
        let scheduler = ConsensusScheduler::new(config.queue.clone(), engine, bus.clone());

        debug!("all SwarmOracle subsystems initialized");
        Ok(Self {
            config,
            store,
            bus,
            scheduler,
        })
    }

    /// Start background processing (the worker pool).
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start();
        info!("SwarmOracle core started");
        Ok(())
    }

    /// Stop background processing and cancel in-flight runs.
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.stop();
        info!("SwarmOracle core stopped");
        Ok(())
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Handle to the `swarm:events` bus for additional subscribers.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Direct store handle for advanced read paths.
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    pub fn scheduler(&self) -> ConsensusScheduler {
        self.scheduler.clone()
    }

    /// Request a consensus run for a question. Deduplicated: at most one
    /// job per question is waiting or active at any instant.
    pub async fn trigger_consensus(
        &self,
        question_id: QuestionId,
        options: TriggerOptions,
    ) -> TriggerReceipt {
        self.scheduler.trigger(question_id, options).await
    }

    /// Latest consensus outcome for a question.
    pub async fn get_consensus(&self, question_id: QuestionId) -> Result<ConsensusReport> {
        // Existence check first so unknown questions fail loudly.
        self.store.question(question_id).await?;
        Ok(ConsensusReport {
            log: self.store.latest_log(question_id).await?,
            weights: self.store.ranked_weights(question_id).await?,
            answers: self.store.answer_summaries(question_id).await?,
        })
    }

    /// Combined calculation and question status.
    pub async fn get_status(&self, question_id: QuestionId) -> Result<StatusReport> {
        let question = self.store.question(question_id).await?;
        let answer_count = self.store.answer_count(question_id).await?;
        let has_consensus = question.consensus_reached_at.is_some()
            || matches!(
                question.status,
                QuestionStatus::Consensus | QuestionStatus::Verified
            );
        let progress = if has_consensus {
            1.0
        } else if question.min_answers == 0 {
            1.0
        } else {
            (answer_count as f64 / question.min_answers as f64).min(1.0)
        };

        Ok(StatusReport {
            calculation: self.scheduler.status(question_id),
            question_status: question.status,
            answer_count,
            consensus_reached_at: question.consensus_reached_at,
            has_consensus,
            progress,
        })
    }

    /// Create a question and announce it on the bus.
    pub async fn create_question(&self, draft: QuestionDraft) -> Result<Question> {
        let question = Question {
            id: Uuid::new_v4(),
            content: draft.content,
            category: draft.category,
            status: QuestionStatus::Open,
            min_answers: draft.min_answers,
            consensus_threshold: draft.consensus_threshold.clamp(0.0, 1.0),
            open_until: draft.open_until,
            consensus_reached_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_question(question.clone()).await?;
        self.bus.publish(SwarmEvent::QuestionCreated {
            question_id: question.id,
            category: format!("{:?}", question.category),
            min_answers: question.min_answers,
        });
        Ok(question)
    }

    /// Register a scoring agent with a fresh track record.
    pub async fn register_agent(&self, draft: AgentDraft) -> Result<Agent> {
        let agent = Agent {
            id: Uuid::new_v4(),
            name: draft.name,
            reputation_score: 0.0,
            accuracy_rate: 0.0,
            total_answers: 0,
            capabilities: draft.capabilities,
        };
        self.store.insert_agent(agent.clone()).await?;
        Ok(agent)
    }

    /// Submit an answer and announce it on the bus. The store enforces the
    /// one-answer-per-agent fingerprint.
    pub async fn submit_answer(&self, draft: AnswerDraft) -> Result<Answer> {
        let answer = Answer {
            id: Uuid::new_v4(),
            question_id: draft.question_id,
            agent_id: draft.agent_id,
            content: draft.content,
            reasoning: draft.reasoning,
            confidence: draft.confidence.clamp(0.0, 1.0),
            final_weight: None,
            consensus_rank: None,
            submitted_at: Utc::now(),
        };
        self.store.insert_answer(answer.clone()).await?;
        self.bus.publish(SwarmEvent::AnswerSubmitted {
            question_id: answer.question_id,
            answer_id: answer.id,
            agent_id: answer.agent_id,
            confidence: answer.confidence,
        });
        Ok(answer)
    }

    /// Place an active stake on an answer.
    pub async fn place_stake(&self, draft: StakeDraft) -> Result<Stake> {
        let stake = Stake {
            id: Uuid::new_v4(),
            answer_id: draft.answer_id,
            agent_id: draft.agent_id,
            amount: draft.amount,
            status: StakeStatus::Active,
            placed_at: Utc::now(),
        };
        self.store.insert_stake(stake.clone()).await?;
        Ok(stake)
    }

    /// Open the next debate round for a question.
    pub async fn open_debate_round(
        &self,
        question_id: QuestionId,
        round_number: u32,
    ) -> Result<DebateRound> {
        let round = DebateRound {
            id: Uuid::new_v4(),
            question_id,
            round_number,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.store.open_debate_round(round.clone()).await?;
        Ok(round)
    }

    /// Raise a critique; the first critique against an open question moves
    /// it into debate.
    pub async fn submit_critique(&self, draft: CritiqueDraft) -> Result<Critique> {
        let critique = Critique {
            id: Uuid::new_v4(),
            debate_round_id: draft.debate_round_id,
            critic_agent_id: draft.critic_agent_id,
            target_answer_id: draft.target_answer_id,
            kind: draft.kind,
            impact: draft.impact.clamp(0.0, 1.0),
            created_at: Utc::now(),
        };
        self.store.insert_critique(critique.clone()).await?;
        Ok(critique)
    }
}
