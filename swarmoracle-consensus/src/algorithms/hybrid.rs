//! Hybrid blend of all four signals.

use swarmoracle_storage::Snapshot;

use crate::types::WeightVectors;

const CONFIDENCE_TERM: f64 = 0.2;
const REPUTATION_TERM: f64 = 0.3;
const STAKE_TERM: f64 = 0.2;
const SIMILARITY_TERM: f64 = 0.2;

/// Debate multiplier coefficients: a fully penalized answer keeps 90% of its
/// base, a fully boosted one gains at most the debate weight's 10% share.
const DEBATE_SCALE: f64 = 0.1;
const DEBATE_FLOOR: f64 = 0.9;

/// Run the hybrid blend over all answers.
///
/// `base = 0.2·confidence + 0.3·W_rep + 0.2·W_stk + 0.2·avgSim`, then
/// `final = max(0, base · (0.1·W_deb + 0.9))`. The debate multiplier binds
/// to the whole base, not the similarity term alone.
pub fn hybrid_weights(snapshot: &Snapshot, weights: &WeightVectors) -> Vec<f64> {
    let matrix = weights.similarity.matrix();

    snapshot
        .answers
        .iter()
        .enumerate()
        .map(|(idx, view)| {
            let reputation = weights
                .reputation
                .get(&view.agent.id)
                .copied()
                .unwrap_or(0.0);
            let base = CONFIDENCE_TERM * view.answer.confidence
                + REPUTATION_TERM * reputation
                + STAKE_TERM * weights.stake[idx]
                + SIMILARITY_TERM * matrix.average_for(idx);
            let debate_multiplier = DEBATE_SCALE * weights.debate[idx] + DEBATE_FLOOR;
            (base * debate_multiplier).max(0.0)
        })
        .collect()
}
