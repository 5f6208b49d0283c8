//! The consensus engine: one call runs the full pipeline for a question.
//!
//! Load evidence, compute the four weight vectors concurrently, vote, commit
//! atomically, then publish. The commit transaction is the only
//! serialization point; everything before it is pure computation over the
//! snapshot. `consensus:calculated` for a run is published strictly after
//! its commit completes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use swarmoracle_embedding::EmbeddingProvider;
use swarmoracle_events::{EventBus, LeaderboardEntry, SwarmEvent};
use swarmoracle_storage::{
    ConsensusLog, ConsensusStore, ConsensusWeight, ResultCommit, Snapshot,
};

use crate::algorithms;
use crate::clock::{Clock, SystemClock};
use crate::error::ConsensusError;
use crate::finalize::finalize;
use crate::loader::load_snapshot;
use crate::types::{AlgorithmResult, ConsensusRequest, WeightVectors};
use crate::weights::{self, SemanticOptions};

/// Configuration for the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Budget for the batched embedding call before the lexical fallback.
    pub embed_timeout: Duration,

    /// Per-job budget for scoring and committing, per 100 answers; the
    /// effective budget scales linearly with snapshot size. Exceeding it is
    /// a transient failure eligible for retry.
    pub job_budget: Duration,

    /// Post-consensus settlement of stakes and reputation.
    pub settlement: SettlementConfig,
}

/// Settlement behavior once a run reaches consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub enabled: bool,
    /// Reputation granted to the winning answer's author.
    pub winner_reputation_bonus: f64,
    /// Reputation deducted from every other author, floored at zero.
    pub loser_reputation_penalty: f64,
    /// Rows carried in the `leaderboard:updated` event.
    pub leaderboard_size: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(10),
            job_budget: Duration::from_secs(5),
            settlement: SettlementConfig::default(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            winner_reputation_bonus: 5.0,
            loser_reputation_penalty: 1.0,
            leaderboard_size: 10,
        }
    }
}

/// Runs consensus for one question at a time over injected ports.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    store: Arc<dyn ConsensusStore>,
    embedding: Arc<dyn EmbeddingProvider>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        store: Arc<dyn ConsensusStore>,
        embedding: Arc<dyn EmbeddingProvider>,
        bus: EventBus,
    ) -> Self {
        Self::with_clock(config, store, embedding, bus, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ConsensusConfig,
        store: Arc<dyn ConsensusStore>,
        embedding: Arc<dyn EmbeddingProvider>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            embedding,
            bus,
            clock,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Execute one consensus run end to end.
    ///
    /// Cancellation is honored just before loading, inside the embedding
    /// call, and just before the commit. Exceeding the scaled job budget
    /// surfaces as a transient `BudgetExceeded`.
    pub async fn execute(
        &self,
        request: &ConsensusRequest,
        cancel: &CancellationToken,
    ) -> Result<AlgorithmResult, ConsensusError> {
        let started = self.clock.now();

        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }

        let snapshot = load_snapshot(self.store.as_ref(), request.question_id).await?;
        let budget = self.budget_for(snapshot.participant_count());

        let result = tokio::time::timeout(
            budget,
            self.score_and_commit(request, &snapshot, started, cancel),
        )
        .await
        .map_err(|_| ConsensusError::BudgetExceeded(budget))??;

        info!(
            question_id = %request.question_id,
            algorithm = %result.algorithm,
            participants = result.participant_count,
            consensus_reached = result.consensus_reached,
            strength = result.consensus_strength,
            "consensus run committed"
        );
        Ok(result)
    }

    /// Linear scaling: the configured budget covers each started block of
    /// 100 answers.
    fn budget_for(&self, participants: usize) -> Duration {
        let blocks = (participants.max(1) + 99) / 100;
        self.config.job_budget * blocks as u32
    }

    async fn score_and_commit(
        &self,
        request: &ConsensusRequest,
        snapshot: &Snapshot,
        started: std::time::Instant,
        cancel: &CancellationToken,
    ) -> Result<AlgorithmResult, ConsensusError> {
        let options = SemanticOptions {
            embed_timeout: self.config.embed_timeout,
        };

        // The four calculators run concurrently; only the semantic one can
        // suspend, the rest are pure over the snapshot.
        let (similarity, reputation, stake, debate) = tokio::join!(
            weights::compute_similarity(self.embedding.as_ref(), &options, cancel, snapshot),
            async { weights::reputation_weights(snapshot) },
            async { weights::stake_weights(snapshot) },
            async { weights::debate_weights(snapshot) },
        );
        let similarity = similarity?;
        let used_fallback = similarity.is_fallback();
        let vectors = WeightVectors {
            similarity,
            reputation,
            stake,
            debate,
        };

        let kind = algorithms::select_algorithm(snapshot, request.force_algorithm);
        debug!(question_id = %request.question_id, algorithm = %kind, "algorithm selected");

        let raw = algorithms::run_algorithm(kind, snapshot, &vectors);
        let result = finalize(snapshot, kind, raw, used_fallback)?;

        if cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }

        let calculation_time_ms =
            self.clock.now().duration_since(started).as_millis() as u64;
        let committed_at = self.clock.wall();

        let rows: Vec<ConsensusWeight> = result
            .ranked
            .iter()
            .map(|ranked| ConsensusWeight {
                question_id: snapshot.question.id,
                answer_id: ranked.answer_id,
                agent_id: ranked.agent_id,
                final_weight: ranked.final_weight,
                rank: ranked.rank,
            })
            .collect();

        self.store
            .commit_result(ResultCommit {
                question_id: snapshot.question.id,
                weights: rows,
                consensus_reached: result.consensus_reached,
                committed_at,
                log: ConsensusLog {
                    id: Uuid::new_v4(),
                    question_id: snapshot.question.id,
                    algorithm: kind.to_string(),
                    participant_count: result.participant_count,
                    confidence_level: result.confidence_level,
                    winning_answer_id: result.winning_answer_id,
                    consensus_strength: result.consensus_strength,
                    calculation_time_ms,
                    created_at: committed_at,
                },
            })
            .await?;

        // Publication is ordered strictly after the commit.
        self.bus.publish(SwarmEvent::ConsensusCalculated {
            question_id: snapshot.question.id,
            algorithm: kind.to_string(),
            winning_answer_id: result.winning_answer_id,
            consensus_strength: result.consensus_strength,
            confidence_level: result.confidence_level,
            participant_count: result.participant_count,
            consensus_reached: result.consensus_reached,
        });

        if result.consensus_reached && self.config.settlement.enabled {
            self.settle(snapshot, &result).await;
        }

        Ok(result)
    }

    /// Settle stakes and reputation after a reached consensus. Best-effort:
    /// the run already committed, so settlement failures are logged and
    /// swallowed.
    async fn settle(&self, snapshot: &Snapshot, result: &AlgorithmResult) {
        let winner = match result.winning_answer_id {
            Some(winner) => winner,
            None => return,
        };

        match self
            .store
            .settle_stakes(snapshot.question.id, winner)
            .await
        {
            Ok(settlement) => debug!(
                question_id = %snapshot.question.id,
                won = settlement.won.len(),
                lost = settlement.lost.len(),
                "stakes settled"
            ),
            Err(err) => warn!(
                question_id = %snapshot.question.id,
                error = %err,
                "stake settlement failed"
            ),
        }

        let settlement = &self.config.settlement;
        let mut updated = Vec::with_capacity(snapshot.answers.len());
        for view in &snapshot.answers {
            let won = view.answer.id == winner;
            let delta = if won {
                settlement.winner_reputation_bonus
            } else {
                -settlement.loser_reputation_penalty
            };
            match self
                .store
                .apply_agent_outcome(view.agent.id, won, delta)
                .await
            {
                Ok(agent) => {
                    self.bus.publish(SwarmEvent::AgentReputationUpdated {
                        agent_id: agent.id,
                        reputation_score: agent.reputation_score,
                        accuracy_rate: agent.accuracy_rate,
                    });
                    updated.push(agent);
                }
                Err(err) => warn!(
                    agent_id = %view.agent.id,
                    error = %err,
                    "reputation update failed"
                ),
            }
        }

        updated.sort_by(|a, b| {
            b.reputation_score
                .partial_cmp(&a.reputation_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let entries: Vec<LeaderboardEntry> = updated
            .into_iter()
            .take(settlement.leaderboard_size)
            .map(|agent| LeaderboardEntry {
                agent_id: agent.id,
                agent_name: agent.name,
                reputation_score: agent.reputation_score,
                accuracy_rate: agent.accuracy_rate,
            })
            .collect();
        self.bus.publish(SwarmEvent::LeaderboardUpdated { entries });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use swarmoracle_embedding::HashingEmbeddingProvider;
    use swarmoracle_storage::{
        Agent, Answer, MemoryStore, Question, QuestionCategory, QuestionStatus,
    };

    fn engine_over(store: Arc<MemoryStore>) -> ConsensusEngine {
        ConsensusEngine::new(
            ConsensusConfig::default(),
            store,
            Arc::new(HashingEmbeddingProvider::new(64)),
            EventBus::new(),
        )
    }

    async fn seed_question(
        store: &MemoryStore,
        category: QuestionCategory,
        threshold: f64,
        answers: &[(f64, f64)],
    ) -> Question {
        let question = Question {
            id: Uuid::new_v4(),
            content: "which design wins?".into(),
            category,
            status: QuestionStatus::Open,
            min_answers: 1,
            consensus_threshold: threshold,
            open_until: None,
            consensus_reached_at: None,
            created_at: Utc::now(),
        };
        store.insert_question(question.clone()).await.unwrap();
        for (i, (reputation, confidence)) in answers.iter().enumerate() {
            let agent = Agent {
                id: Uuid::new_v4(),
                name: format!("agent-{i}"),
                reputation_score: *reputation,
                accuracy_rate: 0.5,
                total_answers: 0,
                capabilities: vec![],
            };
            store.insert_agent(agent.clone()).await.unwrap();
            store
                .insert_answer(Answer {
                    id: Uuid::new_v4(),
                    question_id: question.id,
                    agent_id: agent.id,
                    content: format!("candidate design {i}"),
                    reasoning: "shared reasoning".into(),
                    confidence: *confidence,
                    final_weight: None,
                    consensus_rank: None,
                    submitted_at: Utc::now() + chrono::Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }
        question
    }

    fn request(question_id: Uuid) -> ConsensusRequest {
        ConsensusRequest {
            job_id: Uuid::new_v4(),
            question_id,
            force_algorithm: None,
            requested_by: None,
        }
    }

    #[tokio::test]
    async fn run_commits_rows_and_publishes_after_commit() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(Arc::clone(&store));
        let mut events = engine.bus().subscribe();

        let question =
            seed_question(&store, QuestionCategory::Creative, 0.3, &[(100.0, 0.9), (20.0, 0.2)])
                .await;

        let result = engine
            .execute(&request(question.id), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.participant_count, 2);
        assert!(result.consensus_reached);

        let rows = store.ranked_weights(question.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rank, 1);
        assert!(rows[0].final_weight >= rows[1].final_weight);

        let log = store.latest_log(question.id).await.unwrap().unwrap();
        assert_eq!(log.participant_count, 2);
        assert_eq!(log.winning_answer_id, result.winning_answer_id);

        // First event on the bus is the calculated notification.
        let envelope = events.recv().await.unwrap();
        match envelope.event {
            SwarmEvent::ConsensusCalculated {
                question_id,
                consensus_reached,
                ..
            } => {
                assert_eq!(question_id, question.id);
                assert!(consensus_reached);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn settlement_updates_reputation_and_emits_leaderboard() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(Arc::clone(&store));
        let mut events = engine.bus().subscribe();

        let question =
            seed_question(&store, QuestionCategory::Creative, 0.3, &[(100.0, 0.9), (20.0, 0.2)])
                .await;
        engine
            .execute(&request(question.id), &CancellationToken::new())
            .await
            .unwrap();

        let mut saw_reputation = 0;
        let mut saw_leaderboard = false;
        while let Ok(envelope) = events.try_recv() {
            match envelope.event {
                SwarmEvent::AgentReputationUpdated { .. } => saw_reputation += 1,
                SwarmEvent::LeaderboardUpdated { entries } => {
                    saw_leaderboard = true;
                    assert_eq!(entries.len(), 2);
                    assert!(entries[0].reputation_score >= entries[1].reputation_score);
                }
                _ => {}
            }
        }
        assert_eq!(saw_reputation, 2);
        assert!(saw_leaderboard);
    }

    #[tokio::test]
    async fn rerun_is_idempotent_on_weights() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(Arc::clone(&store));

        let question =
            seed_question(&store, QuestionCategory::Creative, 2.0, &[(60.0, 0.8), (40.0, 0.6)])
                .await;

        // Threshold 2.0 is unreachable, so the question stays scorable and
        // settlement never perturbs the inputs between runs.
        engine
            .execute(&request(question.id), &CancellationToken::new())
            .await
            .unwrap();
        let first = store.ranked_weights(question.id).await.unwrap();

        engine
            .execute(&request(question.id), &CancellationToken::new())
            .await
            .unwrap();
        let second = store.ranked_weights(question.id).await.unwrap();

        assert_eq!(first, second);

        // Each run appended its own audit row.
        assert_eq!(
            store.latest_log(question.id).await.unwrap().unwrap().participant_count,
            2
        );
    }

    #[tokio::test]
    async fn pre_cancelled_run_never_touches_the_store() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(Arc::clone(&store));
        let question =
            seed_question(&store, QuestionCategory::Creative, 0.3, &[(10.0, 0.5)]).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .execute(&request(question.id), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::Cancelled));
        assert!(store.latest_log(question.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn signal_free_answers_surface_no_valid_answers() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(Arc::clone(&store));

        // Zero reputation pool, zero confidence, no stakes, disjoint
        // contents: every hybrid base term is zero.
        let question = Question {
            id: Uuid::new_v4(),
            content: "q".into(),
            category: QuestionCategory::Creative,
            status: QuestionStatus::Open,
            min_answers: 1,
            consensus_threshold: 0.5,
            open_until: None,
            consensus_reached_at: None,
            created_at: Utc::now(),
        };
        store.insert_question(question.clone()).await.unwrap();
        for (i, content) in ["alpha", "zebra"].iter().enumerate() {
            let agent = Agent {
                id: Uuid::new_v4(),
                name: format!("agent-{i}"),
                reputation_score: 0.0,
                accuracy_rate: 0.0,
                total_answers: 0,
                capabilities: vec![],
            };
            store.insert_agent(agent.clone()).await.unwrap();
            store
                .insert_answer(Answer {
                    id: Uuid::new_v4(),
                    question_id: question.id,
                    agent_id: agent.id,
                    content: content.to_string(),
                    reasoning: String::new(),
                    confidence: 0.0,
                    final_weight: None,
                    consensus_rank: None,
                    submitted_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let err = engine
            .execute(&request(question.id), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::NoValidAnswers));
        assert!(store.latest_log(question.id).await.unwrap().is_none());
    }
}
