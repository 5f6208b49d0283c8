//! Semantic similarity with lexical fallback.
//!
//! All answers of a question are embedded in one batched provider call; the
//! pairwise cosine matrix is the primary semantic signal. Provider failure
//! and timeout both degrade to token Jaccard over the answer contents. The
//! degradation is logged and carried as [`SimilarityOutcome::Fallback`],
//! never surfaced as a hard error.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use swarmoracle_embedding::EmbeddingProvider;
use swarmoracle_storage::Snapshot;

use crate::error::ConsensusError;
use crate::types::{SimilarityMatrix, SimilarityOutcome};

/// Tunables for the semantic calculator.
#[derive(Debug, Clone)]
pub struct SemanticOptions {
    /// Budget for the batched embedding call before falling back.
    pub embed_timeout: Duration,
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(10),
        }
    }
}

/// Compute the pairwise similarity outcome for a snapshot.
///
/// Cancellation is honored while the embedding call is in flight; it is the
/// only suspension point in the whole weight phase.
pub async fn compute_similarity(
    provider: &dyn EmbeddingProvider,
    options: &SemanticOptions,
    cancel: &CancellationToken,
    snapshot: &Snapshot,
) -> Result<SimilarityOutcome, ConsensusError> {
    let n = snapshot.answers.len();
    if n <= 1 {
        return Ok(SimilarityOutcome::Embedded(SimilarityMatrix::from_fn(
            n,
            |_, _| 0.0,
        )));
    }

    let texts: Vec<String> = snapshot
        .answers
        .iter()
        .map(|view| format!("{} {}", view.answer.content, view.answer.reasoning))
        .collect();

    let embedded = tokio::select! {
        _ = cancel.cancelled() => return Err(ConsensusError::Cancelled),
        result = tokio::time::timeout(options.embed_timeout, provider.embed(&texts)) => result,
    };

    match embedded {
        Ok(Ok(vectors)) if vectors.len() == n => {
            let matrix =
                SimilarityMatrix::from_fn(n, |i, j| cosine(&vectors[i], &vectors[j]));
            Ok(SimilarityOutcome::Embedded(matrix))
        }
        Ok(Ok(vectors)) => {
            warn!(
                expected = n,
                got = vectors.len(),
                "embedding batch size mismatch, using lexical fallback"
            );
            Ok(SimilarityOutcome::Fallback(jaccard_matrix(snapshot)))
        }
        Ok(Err(err)) => {
            warn!(error = %err, "embedding provider failed, using lexical fallback");
            Ok(SimilarityOutcome::Fallback(jaccard_matrix(snapshot)))
        }
        Err(_) => {
            warn!(
                timeout_ms = options.embed_timeout.as_millis() as u64,
                "embedding call timed out, using lexical fallback"
            );
            Ok(SimilarityOutcome::Fallback(jaccard_matrix(snapshot)))
        }
    }
}

/// Cosine similarity of two embedding vectors; zero when either has no
/// magnitude. The matrix constructor clamps into `[0, 1]`.
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Token Jaccard over whitespace-split lowercased content words.
fn jaccard_matrix(snapshot: &Snapshot) -> SimilarityMatrix {
    let token_sets: Vec<HashSet<String>> = snapshot
        .answers
        .iter()
        .map(|view| {
            view.answer
                .content
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .collect();

    SimilarityMatrix::from_fn(snapshot.answers.len(), |i, j| {
        jaccard(&token_sets[i], &token_sets[j])
    })
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
