//! Reputation-weighted agreement with a supermajority gate.
//!
//! Despite the name this is an agreement heuristic, not a protocol tolerating
//! adversarial nodes: an answer keeps weight only when a supermajority of its
//! peers corroborate it semantically, weighted by those peers' reputation.

use swarmoracle_storage::Snapshot;

use crate::types::WeightVectors;

/// Pairwise similarity above which a peer counts as corroborating.
const SIMILARITY_GATE: f64 = 0.7;
/// Fraction of peers that must corroborate for an answer to keep weight.
const SUPERMAJORITY: f64 = 2.0 / 3.0;
/// Number of stability passes; they do not feed back into each other and the
/// last pass wins.
const STABILITY_PASSES: usize = 3;

/// Run the agreement gate over all answers.
///
/// Per pass, for every answer `a`: sum `sim(a, b) · W_rep[agent(b)]` over
/// peers `b ≠ a` with `sim(a, b) > 0.7` and count them. The support ratio is
/// corroborating peers over `n − 1` possible peers; below the two-thirds
/// supermajority the answer collapses to zero.
pub fn bft_weights(snapshot: &Snapshot, weights: &WeightVectors) -> Vec<f64> {
    let n = snapshot.answers.len();
    let matrix = weights.similarity.matrix();
    let mut result = vec![0.0; n];

    for _pass in 0..STABILITY_PASSES {
        for (i, _view) in snapshot.answers.iter().enumerate() {
            let mut accumulated = 0.0;
            let mut peers = 0usize;
            for (j, peer) in snapshot.answers.iter().enumerate() {
                if i == j {
                    continue;
                }
                let sim = matrix.get(i, j);
                if sim > SIMILARITY_GATE {
                    let peer_reputation = weights
                        .reputation
                        .get(&peer.agent.id)
                        .copied()
                        .unwrap_or(0.0);
                    accumulated += sim * peer_reputation;
                    peers += 1;
                }
            }

            let support = if n > 1 {
                peers as f64 / (n - 1) as f64
            } else {
                0.0
            };
            result[i] = if support > SUPERMAJORITY { accumulated } else { 0.0 };
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SnapshotBuilder;
    use crate::types::{SimilarityMatrix, SimilarityOutcome};
    use crate::weights::reputation_weights;

    /// Snapshot with `cluster` mutually-similar answers and `outliers`
    /// unrelated ones, similarity fixed above/below the gate.
    fn clustered(cluster: usize, outliers: usize) -> (Snapshot, WeightVectors) {
        let mut builder = SnapshotBuilder::new();
        for _ in 0..(cluster + outliers) {
            builder.push_answer(10.0, 0.5, 0, 0.5);
        }
        let snapshot = builder.build();

        let matrix = SimilarityMatrix::from_fn(cluster + outliers, |i, j| {
            if i < cluster && j < cluster {
                0.9
            } else {
                0.1
            }
        });
        let reputation = reputation_weights(&snapshot);
        let n = snapshot.answers.len();
        let vectors = WeightVectors {
            similarity: SimilarityOutcome::Embedded(matrix),
            reputation,
            stake: vec![0.0; n],
            debate: vec![1.0; n],
        };
        (snapshot, vectors)
    }

    #[test]
    fn supermajority_cluster_keeps_weight_outliers_collapse() {
        // 15 of 21 answers pairwise similar: support 14/20 = 0.7 > 2/3.
        let (snapshot, vectors) = clustered(15, 6);
        let result = bft_weights(&snapshot, &vectors);

        for i in 0..15 {
            assert!(result[i] > 0.0, "cluster member {i} lost its weight");
        }
        for i in 15..21 {
            assert_eq!(result[i], 0.0, "outlier {i} kept weight");
        }
    }

    #[test]
    fn sub_supermajority_cluster_collapses_entirely() {
        // 13 of 21: support 12/20 = 0.6 < 2/3.
        let (snapshot, vectors) = clustered(13, 8);
        let result = bft_weights(&snapshot, &vectors);
        assert!(result.iter().all(|w| *w == 0.0));
    }

    #[test]
    fn accumulated_weight_is_similarity_times_peer_reputation() {
        let (snapshot, vectors) = clustered(3, 0);
        let result = bft_weights(&snapshot, &vectors);

        // Every agent has identical reputation weight; each answer has two
        // corroborating peers at similarity 0.9.
        let rep = vectors.reputation.values().next().copied().unwrap();
        let expected = 2.0 * 0.9 * rep;
        for weight in result {
            assert!((weight - expected).abs() < 1e-9);
        }
    }
}
