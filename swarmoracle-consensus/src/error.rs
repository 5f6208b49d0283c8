//! Error taxonomy for consensus runs.
//!
//! Every failure a run can produce maps onto one of five kinds, and retry
//! classification is a pure function of the kind. Reason strings are opaque
//! to callers but stable per kind; they surface unchanged through the job
//! status API and `consensus:failed` events.

use std::time::Duration;

use thiserror::Error;

use swarmoracle_storage::{QuestionId, QuestionStatus, StoreError};

/// Classification of a consensus failure, driving retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or missing evidence; fails fast, never retried.
    Validation,
    /// Plausibly succeeds on retry (store hiccup, timeout).
    Transient,
    /// Scoring produced no usable outcome; never retried.
    Logic,
    /// Concurrent state change detected at commit; aborted, never retried.
    Conflict,
    /// Explicit cancellation or shutdown; never retried.
    Cancelled,
}

/// Errors surfaced by the consensus engine.
#[derive(Debug, Clone, Error)]
pub enum ConsensusError {
    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),

    #[error("question {question_id} is {status:?} and cannot be scored")]
    QuestionNotScorable {
        question_id: QuestionId,
        status: QuestionStatus,
    },

    #[error("insufficient evidence: have {have} answers, need {need}")]
    InsufficientEvidence { have: usize, need: usize },

    #[error("no answer retained a positive weight")]
    NoValidAnswers,

    #[error("commit conflict: {0}")]
    CommitConflict(String),

    #[error("consensus run exceeded its {0:?} budget")]
    BudgetExceeded(Duration),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("consensus run cancelled")]
    Cancelled,
}

impl ConsensusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsensusError::QuestionNotFound(_)
            | ConsensusError::QuestionNotScorable { .. }
            | ConsensusError::InsufficientEvidence { .. } => ErrorKind::Validation,
            ConsensusError::NoValidAnswers => ErrorKind::Logic,
            ConsensusError::CommitConflict(_) => ErrorKind::Conflict,
            ConsensusError::BudgetExceeded(_) | ConsensusError::StoreUnavailable(_) => {
                ErrorKind::Transient
            }
            ConsensusError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the job queue should re-enqueue the run.
    pub fn retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Stable machine-readable reason, one per error shape.
    pub fn reason(&self) -> &'static str {
        match self {
            ConsensusError::QuestionNotFound(_) => "question_not_found",
            ConsensusError::QuestionNotScorable { .. } => "question_not_scorable",
            ConsensusError::InsufficientEvidence { .. } => "insufficient_evidence",
            ConsensusError::NoValidAnswers => "no_valid_answers",
            ConsensusError::CommitConflict(_) => "commit_conflict",
            ConsensusError::BudgetExceeded(_) => "budget_exceeded",
            ConsensusError::StoreUnavailable(_) => "store_unavailable",
            ConsensusError::Cancelled => "cancelled",
        }
    }
}

impl From<StoreError> for ConsensusError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuestionNotFound(id) => ConsensusError::QuestionNotFound(id),
            StoreError::StatusConflict { .. } => ConsensusError::CommitConflict(err.to_string()),
            StoreError::Unavailable(msg) => ConsensusError::StoreUnavailable(msg),
            other => ConsensusError::CommitConflict(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_retry() {
        assert!(ConsensusError::StoreUnavailable("deadlock".into()).retryable());
        assert!(ConsensusError::BudgetExceeded(Duration::from_secs(5)).retryable());
        assert!(!ConsensusError::NoValidAnswers.retryable());
        assert!(!ConsensusError::Cancelled.retryable());
        assert!(
            !ConsensusError::InsufficientEvidence { have: 2, need: 3 }.retryable()
        );
    }

    #[test]
    fn reasons_are_stable_per_kind() {
        assert_eq!(
            ConsensusError::InsufficientEvidence { have: 1, need: 5 }.reason(),
            "insufficient_evidence"
        );
        assert_eq!(ConsensusError::Cancelled.reason(), "cancelled");
        assert_eq!(ConsensusError::NoValidAnswers.reason(), "no_valid_answers");
    }
}
