//! Value types flowing through the consensus pipeline: algorithm selection,
//! similarity matrices, the joined weight vectors, and the ranked outcome.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use swarmoracle_storage::{AgentId, AnswerId, QuestionId};

/// The three voting algorithms the selector can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Reputation-weighted agreement with a supermajority gate. Not a
    /// Byzantine-safe protocol; the name follows the product vocabulary.
    Bft,
    /// Delegated proof of reputation: only the top reputation slice votes.
    Dpor,
    /// Blend of confidence, reputation, stake, similarity, and debate.
    Hybrid,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::Bft => "bft",
            AlgorithmKind::Dpor => "dpor",
            AlgorithmKind::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Dense pairwise similarity matrix over a question's answers, indexed by the
/// snapshot's canonical answer ordering. Values live in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Build from a symmetric pair function; the diagonal is fixed at 1.
    pub fn from_fn(n: usize, mut pair: impl FnMut(usize, usize) -> f64) -> Self {
        let mut values = vec![1.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let sim = pair(i, j).clamp(0.0, 1.0);
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }
        Self { n, values }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    /// Mean similarity of answer `i` to all other answers; 0 when the
    /// question has a single answer.
    pub fn average_for(&self, i: usize) -> f64 {
        if self.n <= 1 {
            return 0.0;
        }
        let sum: f64 = (0..self.n).filter(|&j| j != i).map(|j| self.get(i, j)).sum();
        sum / (self.n - 1) as f64
    }
}

/// How the similarity matrix was produced. Falling back to the lexical path
/// is a degraded-dependency outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityOutcome {
    /// Cosine similarity over provider embeddings.
    Embedded(SimilarityMatrix),
    /// Token Jaccard fallback after provider failure or timeout.
    Fallback(SimilarityMatrix),
}

impl SimilarityOutcome {
    pub fn matrix(&self) -> &SimilarityMatrix {
        match self {
            SimilarityOutcome::Embedded(m) | SimilarityOutcome::Fallback(m) => m,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, SimilarityOutcome::Fallback(_))
    }
}

/// The four weight vectors, joined after concurrent computation.
///
/// `stake` and `debate` are indexed by the snapshot's canonical answer
/// ordering; `reputation` is keyed by agent id.
#[derive(Debug, Clone)]
pub struct WeightVectors {
    pub similarity: SimilarityOutcome,
    pub reputation: HashMap<AgentId, f64>,
    pub stake: Vec<f64>,
    pub debate: Vec<f64>,
}

/// One answer's final position in a consensus outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAnswer {
    pub answer_id: AnswerId,
    pub agent_id: AgentId,
    pub final_weight: f64,
    /// Dense rank starting at 1.
    pub rank: u32,
}

/// The complete outcome of one consensus run, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    pub question_id: QuestionId,
    pub algorithm: AlgorithmKind,
    /// All answers in rank order.
    pub ranked: Vec<RankedAnswer>,
    /// `top_weight / Σ weights`, 0 when the sum is 0.
    pub consensus_strength: f64,
    /// `(top − second) / top` margin; 1.0 for a single answer.
    pub confidence_level: f64,
    pub consensus_reached: bool,
    pub participant_count: usize,
    /// Rank-1 answer id iff consensus was reached.
    pub winning_answer_id: Option<AnswerId>,
    /// Whether the semantic signal came from the lexical fallback.
    pub used_semantic_fallback: bool,
}

/// A single consensus work item handed to the engine.
#[derive(Debug, Clone)]
pub struct ConsensusRequest {
    pub job_id: Uuid,
    pub question_id: QuestionId,
    pub force_algorithm: Option<AlgorithmKind>,
    pub requested_by: Option<AgentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_matrix_is_symmetric_with_unit_diagonal() {
        let m = SimilarityMatrix::from_fn(3, |i, j| (i + j) as f64 / 10.0);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 2), m.get(2, 1));
        assert!((m.get(0, 1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn similarity_values_are_clamped() {
        let m = SimilarityMatrix::from_fn(2, |_, _| 7.0);
        assert_eq!(m.get(0, 1), 1.0);
        let m = SimilarityMatrix::from_fn(2, |_, _| -3.0);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn average_for_single_answer_is_zero() {
        let m = SimilarityMatrix::from_fn(1, |_, _| 0.9);
        assert_eq!(m.average_for(0), 0.0);
    }

    #[test]
    fn average_excludes_self() {
        let m = SimilarityMatrix::from_fn(3, |_, _| 0.5);
        assert!((m.average_for(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn algorithm_names_are_lowercase() {
        assert_eq!(AlgorithmKind::Bft.to_string(), "bft");
        assert_eq!(AlgorithmKind::Dpor.to_string(), "dpor");
        assert_eq!(AlgorithmKind::Hybrid.to_string(), "hybrid");
    }
}
