//! Reputation weight vector.

use std::collections::HashMap;

use swarmoracle_storage::{AgentId, Snapshot};

/// Per-agent accuracy bonus scale.
const ACCURACY_BONUS_FACTOR: f64 = 0.5;
/// Answers needed to max out the experience bonus.
const EXPERIENCE_DIVISOR: f64 = 100.0;
/// Experience bonus ceiling.
const EXPERIENCE_BONUS_CAP: f64 = 0.3;
/// Hard ceiling on any single agent's reputation weight.
const REPUTATION_WEIGHT_CAP: f64 = 2.0;

/// Compute the reputation weight for every answering agent.
///
/// `W_rep = min(rep/ΣR + accuracy·0.5 + min(total/100, 0.3), 2.0)`. When the
/// pool's total reputation is zero, every weight is zero: a swarm with no
/// track record carries no reputation signal.
pub fn reputation_weights(snapshot: &Snapshot) -> HashMap<AgentId, f64> {
    let total: f64 = snapshot
        .answers
        .iter()
        .map(|view| view.agent.reputation_score)
        .sum();

    snapshot
        .answers
        .iter()
        .map(|view| {
            let agent = &view.agent;
            let weight = if total > 0.0 {
                let base = agent.reputation_score / total;
                let accuracy_bonus = agent.accuracy_rate * ACCURACY_BONUS_FACTOR;
                let experience_bonus =
                    (agent.total_answers as f64 / EXPERIENCE_DIVISOR).min(EXPERIENCE_BONUS_CAP);
                (base + accuracy_bonus + experience_bonus).min(REPUTATION_WEIGHT_CAP)
            } else {
                0.0
            };
            (agent.id, weight)
        })
        .collect()
}
