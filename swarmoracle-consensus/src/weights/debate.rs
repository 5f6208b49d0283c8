//! Debate-critique weight vector.

use swarmoracle_storage::{CritiqueKind, Snapshot};

/// Multiplicative factor a single critique applies to its target.
fn critique_factor(kind: CritiqueKind, impact: f64) -> f64 {
    let impact = impact.clamp(0.0, 1.0);
    match kind {
        CritiqueKind::FactualError => 1.0 - 0.8 * impact,
        CritiqueKind::LogicalFlaw => 1.0 - 0.6 * impact,
        CritiqueKind::MissingContext => 1.0 - 0.3 * impact,
        CritiqueKind::Improvement => 1.0 + 0.2 * impact,
    }
}

/// Compute each answer's debate weight, indexed by the snapshot's canonical
/// answer ordering.
///
/// Every answer starts at 1.0; critiques multiply in `created_at` ascending
/// order and the result is clamped at zero. Order matters only for reading
/// intermediate values; the product itself is order-free.
pub fn debate_weights(snapshot: &Snapshot) -> Vec<f64> {
    snapshot
        .answers
        .iter()
        .map(|view| {
            let weight = snapshot
                .critiques_for(view.answer.id)
                .into_iter()
                .fold(1.0, |weight, critique| {
                    weight * critique_factor(critique.kind, critique.impact)
                });
            weight.max(0.0)
        })
        .collect()
}
