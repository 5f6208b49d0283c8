//! Shared finalization: ranking, consensus strength, and the margin-based
//! confidence level.

use swarmoracle_storage::Snapshot;

use crate::error::ConsensusError;
use crate::types::{AlgorithmKind, AlgorithmResult, RankedAnswer};

/// Turn a raw weight vector into a ranked, measured outcome.
///
/// Ordering: weight descending, ties by earliest submission then answer id
/// (the snapshot's canonical order already encodes both, so a stable sort on
/// weight alone suffices). Ranks are a dense 1-based permutation over all
/// answers.
///
/// Fails with `NoValidAnswers` when no answer retained positive weight.
pub fn finalize(
    snapshot: &Snapshot,
    algorithm: AlgorithmKind,
    raw_weights: Vec<f64>,
    used_semantic_fallback: bool,
) -> Result<AlgorithmResult, ConsensusError> {
    debug_assert_eq!(raw_weights.len(), snapshot.answers.len());

    if !raw_weights.iter().any(|w| *w > 0.0) {
        return Err(ConsensusError::NoValidAnswers);
    }

    let mut order: Vec<usize> = (0..snapshot.answers.len()).collect();
    order.sort_by(|a, b| {
        raw_weights[*b]
            .partial_cmp(&raw_weights[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let ranked: Vec<RankedAnswer> = order
        .iter()
        .enumerate()
        .map(|(position, &idx)| {
            let view = &snapshot.answers[idx];
            RankedAnswer {
                answer_id: view.answer.id,
                agent_id: view.agent.id,
                final_weight: raw_weights[idx],
                rank: position as u32 + 1,
            }
        })
        .collect();

    let total: f64 = raw_weights.iter().sum();
    let top = ranked[0].final_weight;
    let second = ranked.get(1).map(|r| r.final_weight);

    let consensus_strength = if total > 0.0 { top / total } else { 0.0 };
    let confidence_level = match second {
        Some(second) if top > 0.0 => (top - second) / top,
        _ => 1.0,
    };
    let consensus_reached = consensus_strength >= snapshot.question.consensus_threshold;

    Ok(AlgorithmResult {
        question_id: snapshot.question.id,
        algorithm,
        winning_answer_id: consensus_reached.then(|| ranked[0].answer_id),
        consensus_strength,
        confidence_level,
        consensus_reached,
        participant_count: snapshot.answers.len(),
        ranked,
        used_semantic_fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SnapshotBuilder;

    fn snapshot(n: usize, threshold: f64) -> Snapshot {
        let mut builder = SnapshotBuilder::new().threshold(threshold);
        for _ in 0..n {
            builder.push_answer(10.0, 0.5, 0, 0.5);
        }
        builder.build()
    }

    #[test]
    fn ranks_are_a_dense_permutation_sorted_by_weight() {
        let snapshot = snapshot(4, 0.9);
        let result = finalize(
            &snapshot,
            AlgorithmKind::Hybrid,
            vec![0.2, 0.8, 0.5, 0.5],
            false,
        )
        .unwrap();

        let ranks: Vec<u32> = result.ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);

        // Weakly decreasing weights along the rank order.
        for pair in result.ranked.windows(2) {
            assert!(pair[0].final_weight >= pair[1].final_weight);
        }

        // The 0.5 tie resolves by submission order: answer 2 before 3.
        assert_eq!(result.ranked[1].answer_id, snapshot.answers[2].answer.id);
        assert_eq!(result.ranked[2].answer_id, snapshot.answers[3].answer.id);
    }

    #[test]
    fn strength_and_confidence_follow_the_ratios() {
        let snapshot = snapshot(2, 0.5);
        let result = finalize(&snapshot, AlgorithmKind::Hybrid, vec![0.6, 0.2], false).unwrap();

        assert!((result.consensus_strength - 0.75).abs() < 1e-12);
        assert!((result.confidence_level - (0.4 / 0.6)).abs() < 1e-12);
        assert!(result.consensus_reached);
        assert_eq!(
            result.winning_answer_id,
            Some(snapshot.answers[0].answer.id)
        );
    }

    #[test]
    fn single_answer_is_fully_confident() {
        let snapshot = snapshot(1, 0.5);
        let result = finalize(&snapshot, AlgorithmKind::Hybrid, vec![0.3], false).unwrap();

        assert_eq!(result.consensus_strength, 1.0);
        assert_eq!(result.confidence_level, 1.0);
        assert!(result.consensus_reached);
    }

    #[test]
    fn below_threshold_leaves_no_winner() {
        let snapshot = snapshot(3, 0.9);
        let result =
            finalize(&snapshot, AlgorithmKind::Bft, vec![0.4, 0.3, 0.3], false).unwrap();

        assert!(!result.consensus_reached);
        assert_eq!(result.winning_answer_id, None);
    }

    #[test]
    fn all_zero_weights_is_a_logic_error() {
        let snapshot = snapshot(2, 0.5);
        let err =
            finalize(&snapshot, AlgorithmKind::Bft, vec![0.0, 0.0], false).unwrap_err();
        assert!(matches!(err, ConsensusError::NoValidAnswers));
    }
}
