//! Snapshot builders shared by the unit tests in this crate.

use chrono::{Duration, Utc};
use uuid::Uuid;

use swarmoracle_storage::{
    Agent, Answer, AnswerId, AnswerView, Critique, CritiqueKind, DebateRound, DebateRoundView,
    Question, QuestionCategory, QuestionStatus, Snapshot, Stake, StakeStatus,
};

/// Incremental snapshot builder with deterministic submission ordering:
/// every pushed answer is submitted one second after the previous one.
pub struct SnapshotBuilder {
    category: QuestionCategory,
    threshold: f64,
    min_answers: usize,
    answers: Vec<AnswerView>,
    critiques: Vec<Critique>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            category: QuestionCategory::Analytical,
            threshold: 0.5,
            min_answers: 1,
            answers: Vec::new(),
            critiques: Vec::new(),
        }
    }

    pub fn category(mut self, category: QuestionCategory) -> Self {
        self.category = category;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Add an answer authored by a fresh agent; returns the answer id.
    pub fn push_answer(
        &mut self,
        reputation: f64,
        accuracy: f64,
        total_answers: u64,
        confidence: f64,
    ) -> AnswerId {
        self.push_answer_with_text(
            reputation,
            accuracy,
            total_answers,
            confidence,
            &format!("answer {}", self.answers.len()),
        )
    }

    pub fn push_answer_with_text(
        &mut self,
        reputation: f64,
        accuracy: f64,
        total_answers: u64,
        confidence: f64,
        content: &str,
    ) -> AnswerId {
        let idx = self.answers.len() as i64;
        let agent = Agent {
            id: Uuid::new_v4(),
            name: format!("agent-{idx}"),
            reputation_score: reputation,
            accuracy_rate: accuracy,
            total_answers,
            capabilities: vec![],
        };
        let answer = Answer {
            id: Uuid::new_v4(),
            question_id: Uuid::nil(),
            agent_id: agent.id,
            content: content.to_string(),
            reasoning: "reasoning".into(),
            confidence,
            final_weight: None,
            consensus_rank: None,
            submitted_at: Utc::now() + Duration::seconds(idx),
        };
        let id = answer.id;
        self.answers.push(AnswerView {
            answer,
            agent,
            stakes: vec![],
        });
        id
    }

    pub fn stake(&mut self, answer_id: AnswerId, amount: f64, status: StakeStatus) {
        let view = self
            .answers
            .iter_mut()
            .find(|view| view.answer.id == answer_id)
            .expect("unknown answer id");
        view.stakes.push(Stake {
            id: Uuid::new_v4(),
            answer_id,
            agent_id: Uuid::new_v4(),
            amount,
            status,
            placed_at: Utc::now(),
        });
    }

    /// Add a critique against an answer; critiques land in one shared round
    /// and are created in call order.
    pub fn critique(&mut self, answer_id: AnswerId, kind: CritiqueKind, impact: f64) {
        let idx = self.critiques.len() as i64;
        self.critiques.push(Critique {
            id: Uuid::new_v4(),
            debate_round_id: Uuid::nil(),
            critic_agent_id: Uuid::new_v4(),
            target_answer_id: answer_id,
            kind,
            impact,
            created_at: Utc::now() + Duration::milliseconds(idx),
        });
    }

    pub fn build(self) -> Snapshot {
        let question_id = Uuid::new_v4();
        let question = Question {
            id: question_id,
            content: "test question".into(),
            category: self.category,
            status: QuestionStatus::Open,
            min_answers: self.min_answers,
            consensus_threshold: self.threshold,
            open_until: None,
            consensus_reached_at: None,
            created_at: Utc::now(),
        };

        let mut answers = self.answers;
        for view in answers.iter_mut() {
            view.answer.question_id = question_id;
        }

        let debate_rounds = if self.critiques.is_empty() {
            vec![]
        } else {
            let round = DebateRound {
                id: Uuid::new_v4(),
                question_id,
                round_number: 1,
                started_at: Utc::now(),
                ended_at: None,
            };
            let mut critiques = self.critiques;
            for critique in critiques.iter_mut() {
                critique.debate_round_id = round.id;
            }
            vec![DebateRoundView { round, critiques }]
        };

        Snapshot::new(question, answers, debate_rounds)
    }
}

/// Shorthand: one `(reputation, accuracy, total_answers, confidence)` tuple
/// per answer.
pub fn snapshot_with_answers(specs: Vec<(f64, f64, u64, f64)>) -> Snapshot {
    let mut builder = SnapshotBuilder::new();
    for (reputation, accuracy, total, confidence) in specs {
        builder.push_answer(reputation, accuracy, total, confidence);
    }
    builder.build()
}
