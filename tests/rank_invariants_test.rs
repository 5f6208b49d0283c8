//! Property checks on finalization: whatever raw weights an algorithm
//! produces, the committed ordering is a dense 1-based permutation with
//! weakly decreasing weights and a winner only when the threshold is met.

use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use swarmoracle_consensus::{finalize, AlgorithmKind};
use swarmoracle_storage::{
    Agent, Answer, AnswerView, Question, QuestionCategory, QuestionStatus, Snapshot,
};

fn snapshot_with(n: usize, threshold: f64) -> Snapshot {
    let question = Question {
        id: Uuid::new_v4(),
        content: "property target".into(),
        category: QuestionCategory::Analytical,
        status: QuestionStatus::Open,
        min_answers: 1,
        consensus_threshold: threshold,
        open_until: None,
        consensus_reached_at: None,
        created_at: Utc::now(),
    };
    let answers = (0..n)
        .map(|i| {
            let agent = Agent {
                id: Uuid::new_v4(),
                name: format!("agent-{i}"),
                reputation_score: 10.0,
                accuracy_rate: 0.5,
                total_answers: 0,
                capabilities: vec![],
            };
            AnswerView {
                answer: Answer {
                    id: Uuid::new_v4(),
                    question_id: question.id,
                    agent_id: agent.id,
                    content: format!("answer {i}"),
                    reasoning: "r".into(),
                    confidence: 0.5,
                    final_weight: None,
                    consensus_rank: None,
                    submitted_at: Utc::now() + chrono::Duration::seconds(i as i64),
                },
                agent,
                stakes: vec![],
            }
        })
        .collect();
    Snapshot::new(question, answers, vec![])
}

proptest! {
    #[test]
    fn ranks_form_a_dense_permutation(
        raw in proptest::collection::vec(0.0f64..10.0, 1..40),
        threshold in 0.0f64..1.0,
    ) {
        prop_assume!(raw.iter().any(|w| *w > 0.0));

        let snapshot = snapshot_with(raw.len(), threshold);
        let result = finalize(&snapshot, AlgorithmKind::Hybrid, raw.clone(), false).unwrap();

        // Dense 1..n permutation.
        let ranks: Vec<u32> = result.ranked.iter().map(|r| r.rank).collect();
        prop_assert_eq!(ranks, (1..=raw.len() as u32).collect::<Vec<u32>>());

        // Weakly decreasing weights along the rank order.
        for pair in result.ranked.windows(2) {
            prop_assert!(pair[0].final_weight >= pair[1].final_weight);
        }

        // Every answer appears exactly once.
        let mut ids: Vec<Uuid> = result.ranked.iter().map(|r| r.answer_id).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), raw.len());

        // The winner is the rank-1 answer exactly when the threshold is met.
        if result.consensus_reached {
            prop_assert_eq!(result.winning_answer_id, Some(result.ranked[0].answer_id));
            prop_assert!(result.consensus_strength >= threshold);
        } else {
            prop_assert_eq!(result.winning_answer_id, None);
        }
    }
}
