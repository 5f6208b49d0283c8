//! Voting algorithms and the deterministic selection rule.
//!
//! Each algorithm is a pure function from `(snapshot, weight vectors)` to a
//! raw final-weight vector indexed by the snapshot's canonical answer
//! ordering; ranking and strength computation happen in the shared
//! finalization step.

mod bft;
mod dpor;
mod hybrid;

pub use bft::bft_weights;
pub use dpor::dpor_weights;
pub use hybrid::hybrid_weights;

use swarmoracle_storage::{QuestionCategory, Snapshot};

use crate::types::{AlgorithmKind, WeightVectors};

/// Answer count above which factual questions switch to the agreement gate.
const BFT_MIN_ANSWERS: usize = 20;
/// Answer count up to which analytical questions use delegated voting.
const DPOR_MAX_ANSWERS: usize = 10;

/// Pick the voting algorithm for a snapshot. A `force` override from the job
/// request replaces the rule entirely.
pub fn select_algorithm(snapshot: &Snapshot, force: Option<AlgorithmKind>) -> AlgorithmKind {
    if let Some(kind) = force {
        return kind;
    }
    let n = snapshot.answers.len();
    match snapshot.question.category {
        QuestionCategory::Factual if n > BFT_MIN_ANSWERS => AlgorithmKind::Bft,
        QuestionCategory::Analytical if n <= DPOR_MAX_ANSWERS => AlgorithmKind::Dpor,
        _ => AlgorithmKind::Hybrid,
    }
}

/// Run the selected algorithm and return the raw weight vector.
pub fn run_algorithm(
    kind: AlgorithmKind,
    snapshot: &Snapshot,
    weights: &WeightVectors,
) -> Vec<f64> {
    match kind {
        AlgorithmKind::Bft => bft_weights(snapshot, weights),
        AlgorithmKind::Dpor => dpor_weights(snapshot, weights),
        AlgorithmKind::Hybrid => hybrid_weights(snapshot, weights),
    }
}
