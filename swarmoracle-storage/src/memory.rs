//! In-memory store backend.
//!
//! Tables are concurrent maps; a single commit lock gives evidence loads a
//! read-consistent view and serializes result commits, which is the only
//! serialization point in the whole pipeline. Per-question overlap is already
//! excluded by the job queue's dedup rule, so the lock is uncontended in
//! practice.

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{ConsensusStore, ResultCommit, StakeSettlement, StoreError};
use crate::types::{
    Agent, AgentId, Answer, AnswerId, AnswerSummary, AnswerView, ConsensusLog, ConsensusWeight,
    Critique, CritiqueId, DebateRound, DebateRoundId, DebateRoundView, Question, QuestionId,
    QuestionStatus, Snapshot, Stake, StakeId, StakeStatus,
};

use async_trait::async_trait;

/// Accuracy updates use an exponential moving average so a single settlement
/// nudges rather than rewrites an agent's track record.
const ACCURACY_EMA_ALPHA: f64 = 0.1;

/// Concurrent in-memory implementation of [`ConsensusStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    questions: DashMap<QuestionId, Question>,
    agents: DashMap<AgentId, Agent>,
    answers: DashMap<AnswerId, Answer>,
    /// Answer ids per question in submission order.
    answers_by_question: DashMap<QuestionId, Vec<AnswerId>>,
    /// Enforces the `(question_id, agent_id)` answer fingerprint.
    answer_fingerprints: DashMap<(QuestionId, AgentId), AnswerId>,
    stakes: DashMap<StakeId, Stake>,
    stakes_by_answer: DashMap<AnswerId, Vec<StakeId>>,
    rounds: DashMap<DebateRoundId, DebateRound>,
    rounds_by_question: DashMap<QuestionId, Vec<DebateRoundId>>,
    /// Enforces the `(question_id, round_number)` uniqueness constraint.
    round_numbers: DashMap<(QuestionId, u32), DebateRoundId>,
    critiques: DashMap<CritiqueId, Critique>,
    critiques_by_round: DashMap<DebateRoundId, Vec<CritiqueId>>,
    /// Current ranked weights per question; fully replaced on each run.
    weights: DashMap<QuestionId, Vec<ConsensusWeight>>,
    /// Append-only audit logs per question, oldest first.
    logs: DashMap<QuestionId, Vec<ConsensusLog>>,
    /// Readers take shared access, commits exclusive access.
    commit_lock: RwLock<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn answer_views(&self, question_id: QuestionId) -> Vec<AnswerView> {
        let ids = self
            .answers_by_question
            .get(&question_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        ids.iter()
            .filter_map(|answer_id| {
                let answer = self.answers.get(answer_id)?.clone();
                let agent = self.agents.get(&answer.agent_id)?.clone();
                let stakes = self
                    .stakes_by_answer
                    .get(answer_id)
                    .map(|stake_ids| {
                        stake_ids
                            .iter()
                            .filter_map(|id| self.stakes.get(id).map(|s| s.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(AnswerView {
                    answer,
                    agent,
                    stakes,
                })
            })
            .collect()
    }

    fn debate_views(&self, question_id: QuestionId) -> Vec<DebateRoundView> {
        let round_ids = self
            .rounds_by_question
            .get(&question_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        round_ids
            .iter()
            .filter_map(|round_id| {
                let round = self.rounds.get(round_id)?.clone();
                let critiques = self
                    .critiques_by_round
                    .get(round_id)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| self.critiques.get(id).map(|c| c.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(DebateRoundView { round, critiques })
            })
            .collect()
    }
}

#[async_trait]
impl ConsensusStore for MemoryStore {
    async fn load_evidence(&self, question_id: QuestionId) -> Result<Snapshot, StoreError> {
        let _read = self.commit_lock.read().await;

        let question = self
            .questions
            .get(&question_id)
            .map(|q| q.clone())
            .ok_or(StoreError::QuestionNotFound(question_id))?;

        let answers = self.answer_views(question_id);
        let debate_rounds = self.debate_views(question_id);

        debug!(
            question_id = %question_id,
            answers = answers.len(),
            rounds = debate_rounds.len(),
            "loaded evidence snapshot"
        );

        Ok(Snapshot::new(question, answers, debate_rounds))
    }

    async fn commit_result(&self, commit: ResultCommit) -> Result<(), StoreError> {
        let _write = self.commit_lock.write().await;

        let question = self
            .questions
            .get(&commit.question_id)
            .map(|q| q.clone())
            .ok_or(StoreError::QuestionNotFound(commit.question_id))?;

        // Validate the entire write-set before mutating anything so a failure
        // leaves prior state untouched.
        for row in &commit.weights {
            if !self.answers.contains_key(&row.answer_id) {
                return Err(StoreError::AnswerNotFound(row.answer_id));
            }
        }
        if commit.consensus_reached
            && question.status != QuestionStatus::Consensus
            && !question.status.can_advance_to(QuestionStatus::Consensus)
        {
            return Err(StoreError::StatusConflict {
                question_id: commit.question_id,
                from: question.status,
                to: QuestionStatus::Consensus,
            });
        }

        // 1. Replace the question's weight rows.
        self.weights
            .insert(commit.question_id, commit.weights.clone());

        // 2. Write each answer's final weight and rank.
        for row in &commit.weights {
            if let Some(mut answer) = self.answers.get_mut(&row.answer_id) {
                answer.final_weight = Some(row.final_weight);
                answer.consensus_rank = Some(row.rank);
            }
        }

        // 3. Advance the question when consensus was reached.
        if commit.consensus_reached {
            if let Some(mut stored) = self.questions.get_mut(&commit.question_id) {
                if stored.status.can_advance_to(QuestionStatus::Consensus) {
                    stored.status = QuestionStatus::Consensus;
                }
                if stored.consensus_reached_at.is_none() {
                    stored.consensus_reached_at = Some(commit.committed_at);
                }
            }
        }

        // 4. Append the audit row.
        self.logs
            .entry(commit.question_id)
            .or_default()
            .push(commit.log.clone());

        debug!(
            question_id = %commit.question_id,
            rows = commit.weights.len(),
            consensus_reached = commit.consensus_reached,
            "committed consensus result"
        );

        Ok(())
    }

    async fn question(&self, question_id: QuestionId) -> Result<Question, StoreError> {
        self.questions
            .get(&question_id)
            .map(|q| q.clone())
            .ok_or(StoreError::QuestionNotFound(question_id))
    }

    async fn latest_log(
        &self,
        question_id: QuestionId,
    ) -> Result<Option<ConsensusLog>, StoreError> {
        Ok(self
            .logs
            .get(&question_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn ranked_weights(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<ConsensusWeight>, StoreError> {
        let mut rows = self
            .weights
            .get(&question_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        rows.sort_by_key(|row| row.rank);
        Ok(rows)
    }

    async fn answer_summaries(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerSummary>, StoreError> {
        let _read = self.commit_lock.read().await;
        Ok(self
            .answer_views(question_id)
            .into_iter()
            .map(|view| AnswerSummary {
                answer_id: view.answer.id,
                agent_id: view.agent.id,
                agent_name: view.agent.name.clone(),
                agent_reputation: view.agent.reputation_score,
                content: view.answer.content.clone(),
                confidence: view.answer.confidence,
                final_weight: view.answer.final_weight,
                consensus_rank: view.answer.consensus_rank,
                submitted_at: view.answer.submitted_at,
            })
            .collect())
    }

    async fn answer_count(&self, question_id: QuestionId) -> Result<usize, StoreError> {
        Ok(self
            .answers_by_question
            .get(&question_id)
            .map(|ids| ids.len())
            .unwrap_or(0))
    }

    async fn insert_question(&self, question: Question) -> Result<(), StoreError> {
        self.questions.insert(question.id, question);
        Ok(())
    }

    async fn insert_agent(&self, agent: Agent) -> Result<(), StoreError> {
        self.agents.insert(agent.id, agent);
        Ok(())
    }

    async fn agent(&self, agent_id: AgentId) -> Result<Agent, StoreError> {
        self.agents
            .get(&agent_id)
            .map(|a| a.clone())
            .ok_or(StoreError::AgentNotFound(agent_id))
    }

    async fn insert_answer(&self, answer: Answer) -> Result<(), StoreError> {
        if !self.questions.contains_key(&answer.question_id) {
            return Err(StoreError::QuestionNotFound(answer.question_id));
        }
        if !self.agents.contains_key(&answer.agent_id) {
            return Err(StoreError::AgentNotFound(answer.agent_id));
        }

        let fingerprint = (answer.question_id, answer.agent_id);
        if self.answer_fingerprints.contains_key(&fingerprint) {
            return Err(StoreError::DuplicateAnswer {
                question_id: answer.question_id,
                agent_id: answer.agent_id,
            });
        }

        self.answer_fingerprints.insert(fingerprint, answer.id);
        self.answers_by_question
            .entry(answer.question_id)
            .or_default()
            .push(answer.id);
        if let Some(mut agent) = self.agents.get_mut(&answer.agent_id) {
            agent.total_answers += 1;
        }
        self.answers.insert(answer.id, answer);
        Ok(())
    }

    async fn insert_stake(&self, stake: Stake) -> Result<(), StoreError> {
        if stake.amount <= 0.0 {
            return Err(StoreError::NonPositiveStake(stake.amount));
        }
        if !self.answers.contains_key(&stake.answer_id) {
            return Err(StoreError::AnswerNotFound(stake.answer_id));
        }
        self.stakes_by_answer
            .entry(stake.answer_id)
            .or_default()
            .push(stake.id);
        self.stakes.insert(stake.id, stake);
        Ok(())
    }

    async fn open_debate_round(&self, round: DebateRound) -> Result<(), StoreError> {
        if !self.questions.contains_key(&round.question_id) {
            return Err(StoreError::QuestionNotFound(round.question_id));
        }
        let key = (round.question_id, round.round_number);
        if self.round_numbers.contains_key(&key) {
            return Err(StoreError::DuplicateDebateRound {
                question_id: round.question_id,
                round_number: round.round_number,
            });
        }
        self.round_numbers.insert(key, round.id);
        self.rounds_by_question
            .entry(round.question_id)
            .or_default()
            .push(round.id);
        self.rounds.insert(round.id, round);
        Ok(())
    }

    async fn insert_critique(&self, critique: Critique) -> Result<(), StoreError> {
        let round = self
            .rounds
            .get(&critique.debate_round_id)
            .map(|r| r.clone())
            .ok_or(StoreError::DebateRoundNotFound(critique.debate_round_id))?;
        let target = self
            .answers
            .get(&critique.target_answer_id)
            .map(|a| a.clone())
            .ok_or(StoreError::AnswerNotFound(critique.target_answer_id))?;

        if target.agent_id == critique.critic_agent_id {
            return Err(StoreError::SelfCritique(critique.critic_agent_id));
        }

        // The first critique moves an open question into debate.
        if let Some(mut question) = self.questions.get_mut(&round.question_id) {
            if question.status == QuestionStatus::Open {
                question.status = QuestionStatus::Debating;
            }
        }

        self.critiques_by_round
            .entry(critique.debate_round_id)
            .or_default()
            .push(critique.id);
        self.critiques.insert(critique.id, critique);
        Ok(())
    }

    async fn settle_stakes(
        &self,
        question_id: QuestionId,
        winning_answer_id: AnswerId,
    ) -> Result<StakeSettlement, StoreError> {
        let answer_ids = self
            .answers_by_question
            .get(&question_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let mut settlement = StakeSettlement::default();
        for answer_id in answer_ids {
            let stake_ids = self
                .stakes_by_answer
                .get(&answer_id)
                .map(|ids| ids.clone())
                .unwrap_or_default();
            for stake_id in stake_ids {
                if let Some(mut stake) = self.stakes.get_mut(&stake_id) {
                    if stake.status != StakeStatus::Active {
                        continue;
                    }
                    if answer_id == winning_answer_id {
                        stake.status = StakeStatus::Won;
                        settlement.won.push(stake.clone());
                    } else {
                        stake.status = StakeStatus::Lost;
                        settlement.lost.push(stake.clone());
                    }
                }
            }
        }
        Ok(settlement)
    }

    async fn apply_agent_outcome(
        &self,
        agent_id: AgentId,
        won: bool,
        reputation_delta: f64,
    ) -> Result<Agent, StoreError> {
        let mut agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or(StoreError::AgentNotFound(agent_id))?;

        agent.reputation_score = (agent.reputation_score + reputation_delta).max(0.0);
        let outcome = if won { 1.0 } else { 0.0 };
        agent.accuracy_rate =
            (1.0 - ACCURACY_EMA_ALPHA) * agent.accuracy_rate + ACCURACY_EMA_ALPHA * outcome;
        Ok(agent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn question(min_answers: usize) -> Question {
        Question {
            id: Uuid::new_v4(),
            content: "What is the airspeed velocity of an unladen swallow?".into(),
            category: crate::types::QuestionCategory::Factual,
            status: QuestionStatus::Open,
            min_answers,
            consensus_threshold: 0.5,
            open_until: None,
            consensus_reached_at: None,
            created_at: Utc::now(),
        }
    }

    fn agent(reputation: f64) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: "agent".into(),
            reputation_score: reputation,
            accuracy_rate: 0.5,
            total_answers: 0,
            capabilities: vec![],
        }
    }

    fn answer(question_id: QuestionId, agent_id: AgentId) -> Answer {
        Answer {
            id: Uuid::new_v4(),
            question_id,
            agent_id,
            content: "an answer".into(),
            reasoning: "because".into(),
            confidence: 0.7,
            final_weight: None,
            consensus_rank: None,
            submitted_at: Utc::now(),
        }
    }

    async fn seed_one_answer(store: &MemoryStore) -> (Question, Agent, Answer) {
        let q = question(1);
        let g = agent(10.0);
        let a = answer(q.id, g.id);
        store.insert_question(q.clone()).await.unwrap();
        store.insert_agent(g.clone()).await.unwrap();
        store.insert_answer(a.clone()).await.unwrap();
        (q, g, a)
    }

    #[tokio::test]
    async fn duplicate_answer_fingerprint_is_rejected() {
        let store = MemoryStore::new();
        let (q, g, _) = seed_one_answer(&store).await;

        let err = store.insert_answer(answer(q.id, g.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAnswer { .. }));
    }

    #[tokio::test]
    async fn insert_answer_bumps_agent_totals() {
        let store = MemoryStore::new();
        let (_, g, _) = seed_one_answer(&store).await;
        assert_eq!(store.agent(g.id).await.unwrap().total_answers, 1);
    }

    #[tokio::test]
    async fn first_critique_moves_question_to_debating() {
        let store = MemoryStore::new();
        let (q, _, a) = seed_one_answer(&store).await;
        let critic = agent(5.0);
        store.insert_agent(critic.clone()).await.unwrap();

        let round = DebateRound {
            id: Uuid::new_v4(),
            question_id: q.id,
            round_number: 1,
            started_at: Utc::now(),
            ended_at: None,
        };
        store.open_debate_round(round.clone()).await.unwrap();
        store
            .insert_critique(Critique {
                id: Uuid::new_v4(),
                debate_round_id: round.id,
                critic_agent_id: critic.id,
                target_answer_id: a.id,
                kind: crate::types::CritiqueKind::LogicalFlaw,
                impact: 0.4,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(
            store.question(q.id).await.unwrap().status,
            QuestionStatus::Debating
        );
    }

    #[tokio::test]
    async fn self_critique_is_rejected() {
        let store = MemoryStore::new();
        let (q, g, a) = seed_one_answer(&store).await;

        let round = DebateRound {
            id: Uuid::new_v4(),
            question_id: q.id,
            round_number: 1,
            started_at: Utc::now(),
            ended_at: None,
        };
        store.open_debate_round(round.clone()).await.unwrap();
        let err = store
            .insert_critique(Critique {
                id: Uuid::new_v4(),
                debate_round_id: round.id,
                critic_agent_id: g.id,
                target_answer_id: a.id,
                kind: crate::types::CritiqueKind::FactualError,
                impact: 0.9,
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SelfCritique(_)));
    }

    #[tokio::test]
    async fn duplicate_round_number_is_rejected() {
        let store = MemoryStore::new();
        let (q, _, _) = seed_one_answer(&store).await;

        let make_round = || DebateRound {
            id: Uuid::new_v4(),
            question_id: q.id,
            round_number: 1,
            started_at: Utc::now(),
            ended_at: None,
        };
        store.open_debate_round(make_round()).await.unwrap();
        let err = store.open_debate_round(make_round()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDebateRound { .. }));
    }

    #[tokio::test]
    async fn commit_replaces_weights_and_appends_log() {
        let store = MemoryStore::new();
        let (q, g, a) = seed_one_answer(&store).await;

        let commit = |weight: f64| ResultCommit {
            question_id: q.id,
            weights: vec![ConsensusWeight {
                question_id: q.id,
                answer_id: a.id,
                agent_id: g.id,
                final_weight: weight,
                rank: 1,
            }],
            consensus_reached: true,
            committed_at: Utc::now(),
            log: ConsensusLog {
                id: Uuid::new_v4(),
                question_id: q.id,
                algorithm: "hybrid".into(),
                participant_count: 1,
                confidence_level: 1.0,
                winning_answer_id: Some(a.id),
                consensus_strength: 1.0,
                calculation_time_ms: 3,
                created_at: Utc::now(),
            },
        };

        store.commit_result(commit(0.4)).await.unwrap();
        store.commit_result(commit(0.6)).await.unwrap();

        let rows = store.ranked_weights(q.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].final_weight - 0.6).abs() < f64::EPSILON);

        // Logs accumulate, weights are replaced.
        let logs = store.logs.get(&q.id).unwrap();
        assert_eq!(logs.len(), 2);

        let question = store.question(q.id).await.unwrap();
        assert_eq!(question.status, QuestionStatus::Consensus);
        assert!(question.consensus_reached_at.is_some());
    }

    #[tokio::test]
    async fn commit_never_downgrades_status() {
        let store = MemoryStore::new();
        let (q, g, a) = seed_one_answer(&store).await;

        // Externally closed while the run was in flight.
        store.questions.get_mut(&q.id).unwrap().status = QuestionStatus::Closed;

        let commit = ResultCommit {
            question_id: q.id,
            weights: vec![ConsensusWeight {
                question_id: q.id,
                answer_id: a.id,
                agent_id: g.id,
                final_weight: 1.0,
                rank: 1,
            }],
            consensus_reached: true,
            committed_at: Utc::now(),
            log: ConsensusLog {
                id: Uuid::new_v4(),
                question_id: q.id,
                algorithm: "hybrid".into(),
                participant_count: 1,
                confidence_level: 1.0,
                winning_answer_id: Some(a.id),
                consensus_strength: 1.0,
                calculation_time_ms: 2,
                created_at: Utc::now(),
            },
        };

        let err = store.commit_result(commit).await.unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));

        // Aborted with no state change.
        assert!(store.ranked_weights(q.id).await.unwrap().is_empty());
        assert!(store.latest_log(q.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settlement_marks_winners_and_losers() {
        let store = MemoryStore::new();
        let (q, _, a) = seed_one_answer(&store).await;
        let other_agent = agent(3.0);
        store.insert_agent(other_agent.clone()).await.unwrap();
        let b = answer(q.id, other_agent.id);
        store.insert_answer(b.clone()).await.unwrap();

        let stake = |answer_id, agent_id| Stake {
            id: Uuid::new_v4(),
            answer_id,
            agent_id,
            amount: 25.0,
            status: StakeStatus::Active,
            placed_at: Utc::now(),
        };
        store.insert_stake(stake(a.id, other_agent.id)).await.unwrap();
        store.insert_stake(stake(b.id, other_agent.id)).await.unwrap();

        let settlement = store.settle_stakes(q.id, a.id).await.unwrap();
        assert_eq!(settlement.won.len(), 1);
        assert_eq!(settlement.lost.len(), 1);
        assert_eq!(settlement.won[0].answer_id, a.id);
    }
}
