//! Evidence loader: a single read-consistent store pass plus the
//! preconditions that gate a consensus run.

use tracing::debug;

use swarmoracle_storage::{ConsensusStore, QuestionId, QuestionStatus, Snapshot};

use crate::error::ConsensusError;

/// Load the full evidence graph for a question and verify it is scorable.
///
/// Preconditions: the question must be `Open` or `Debating`, and it must
/// carry at least `min_answers` answers. Both failures are `Validation`
/// errors and are never retried.
pub async fn load_snapshot(
    store: &dyn ConsensusStore,
    question_id: QuestionId,
) -> Result<Snapshot, ConsensusError> {
    let snapshot = store.load_evidence(question_id).await?;

    match snapshot.question.status {
        QuestionStatus::Open | QuestionStatus::Debating => {}
        status => {
            return Err(ConsensusError::QuestionNotScorable {
                question_id,
                status,
            })
        }
    }

    let have = snapshot.participant_count();
    let need = snapshot.question.min_answers;
    if have < need {
        return Err(ConsensusError::InsufficientEvidence { have, need });
    }

    debug!(
        question_id = %question_id,
        answers = have,
        rounds = snapshot.debate_rounds.len(),
        "evidence snapshot ready"
    );
    Ok(snapshot)
}
