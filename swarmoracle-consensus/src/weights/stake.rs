//! Stake weight vector.

use swarmoracle_storage::{Snapshot, StakeStatus};

/// Compute each answer's share of the active stake pool, indexed by the
/// snapshot's canonical answer ordering.
///
/// Only `Active` stakes participate; settled stakes carry no signal. When no
/// active stake exists on any answer, every weight is zero.
pub fn stake_weights(snapshot: &Snapshot) -> Vec<f64> {
    let sums: Vec<f64> = snapshot
        .answers
        .iter()
        .map(|view| {
            view.stakes
                .iter()
                .filter(|stake| stake.status == StakeStatus::Active)
                .map(|stake| stake.amount)
                .sum()
        })
        .collect();

    let total: f64 = sums.iter().sum();
    if total > 0.0 {
        sums.into_iter().map(|sum| sum / total).collect()
    } else {
        vec![0.0; snapshot.answers.len()]
    }
}
