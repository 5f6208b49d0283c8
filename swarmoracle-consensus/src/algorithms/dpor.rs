//! Delegated proof of reputation.
//!
//! Only the top reputation slice of answers is eligible to carry weight;
//! everyone else is truncated to zero regardless of confidence or stake.
//! Weights are absolute, not normalized: only ordering and ratios matter
//! downstream.

use swarmoracle_storage::Snapshot;

use crate::types::WeightVectors;

/// Fraction of answers (rounded up) that stays eligible.
const ELIGIBLE_FRACTION: f64 = 0.3;

const REPUTATION_TERM: f64 = 0.6;
const STAKE_TERM: f64 = 0.3;
const CONFIDENCE_TERM: f64 = 0.1;

/// Run delegated voting over all answers.
///
/// Eligibility: top `⌈0.3·n⌉` answers sorted by the author's reputation
/// weight descending, ties broken by earliest submission (the snapshot's
/// canonical order). Eligible answers score
/// `0.6·W_rep + 0.3·W_stk + 0.1·confidence`; the rest get zero.
pub fn dpor_weights(snapshot: &Snapshot, weights: &WeightVectors) -> Vec<f64> {
    let n = snapshot.answers.len();
    if n == 0 {
        return vec![];
    }

    let reputation_of = |idx: usize| -> f64 {
        weights
            .reputation
            .get(&snapshot.answers[idx].agent.id)
            .copied()
            .unwrap_or(0.0)
    };

    // Stable sort keeps the canonical submission order for reputation ties.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        reputation_of(*b)
            .partial_cmp(&reputation_of(*a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eligible_count = ((ELIGIBLE_FRACTION * n as f64).ceil() as usize).min(n);

    let mut result = vec![0.0; n];
    for &idx in order.iter().take(eligible_count) {
        let confidence = snapshot.answers[idx].answer.confidence;
        result[idx] = REPUTATION_TERM * reputation_of(idx)
            + STAKE_TERM * weights.stake[idx]
            + CONFIDENCE_TERM * confidence;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SnapshotBuilder;
    use crate::types::{SimilarityMatrix, SimilarityOutcome};
    use crate::weights::{reputation_weights, stake_weights};

    fn vectors_for(snapshot: &Snapshot) -> WeightVectors {
        let n = snapshot.answers.len();
        WeightVectors {
            similarity: SimilarityOutcome::Embedded(SimilarityMatrix::from_fn(n, |_, _| 0.5)),
            reputation: reputation_weights(snapshot),
            stake: stake_weights(snapshot),
            debate: vec![1.0; n],
        }
    }

    #[test]
    fn only_the_top_slice_is_eligible() {
        // Reputations 100, 90, ..., 10: ⌈0.3·10⌉ = 3 eligible.
        let mut builder = SnapshotBuilder::new();
        for i in 0..10u32 {
            builder.push_answer(100.0 - (i as f64) * 10.0, 0.0, 0, 0.99);
        }
        let snapshot = builder.build();
        let vectors = vectors_for(&snapshot);

        let result = dpor_weights(&snapshot, &vectors);
        for i in 0..3 {
            assert!(result[i] > 0.0, "top answer {i} should carry weight");
        }
        for i in 3..10 {
            assert_eq!(result[i], 0.0, "answer {i} should be truncated");
        }
    }

    #[test]
    fn eligible_weight_blends_reputation_stake_confidence() {
        let mut builder = SnapshotBuilder::new();
        let a = builder.push_answer(100.0, 0.0, 0, 0.8);
        builder.push_answer(1.0, 0.0, 0, 0.2);
        builder.push_answer(1.0, 0.0, 0, 0.2);
        builder.stake(a, 40.0, swarmoracle_storage::StakeStatus::Active);
        let snapshot = builder.build();
        let vectors = vectors_for(&snapshot);

        let result = dpor_weights(&snapshot, &vectors);
        let expected = 0.6 * vectors.reputation[&snapshot.answers[0].agent.id]
            + 0.3 * 1.0
            + 0.1 * 0.8;
        assert!((result[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn reputation_ties_break_by_submission_order() {
        let mut builder = SnapshotBuilder::new();
        for _ in 0..4 {
            builder.push_answer(50.0, 0.0, 0, 0.5);
        }
        let snapshot = builder.build();
        let vectors = vectors_for(&snapshot);

        // ⌈0.3·4⌉ = 2: the two earliest submissions win the tie.
        let result = dpor_weights(&snapshot, &vectors);
        assert!(result[0] > 0.0);
        assert!(result[1] > 0.0);
        assert_eq!(result[2], 0.0);
        assert_eq!(result[3], 0.0);
    }
}
