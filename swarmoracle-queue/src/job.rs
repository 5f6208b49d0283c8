//! Job shapes, status reporting, and the priority ordering of the queue.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use swarmoracle_consensus::AlgorithmKind;
use swarmoracle_storage::{AgentId, QuestionId};

/// Options accompanying a consensus trigger.
#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    /// Higher priorities are served first; equal priorities in FIFO order.
    pub priority: i32,
    /// Replaces the deterministic algorithm selection rule.
    pub force_algorithm: Option<AlgorithmKind>,
    pub requested_by: Option<AgentId>,
}

/// What a trigger call returns immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerReceipt {
    pub job_id: Uuid,
    pub status: CalculationStatus,
    /// Rough wait estimate based on current queue depth.
    pub estimated_ms: u64,
}

/// Observable state of consensus calculation for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalculationStatus {
    /// No job queued, running, or recently finished.
    Idle,
    Queued,
    Active,
    Completed { at: DateTime<Utc> },
    Failed { reason: String },
}

/// Queue depth and lifetime counters for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
}

/// A waiting job in the priority heap.
///
/// Ordering: priority descending, then enqueue time ascending, then the
/// monotonic sequence number as the final deterministic tie-break.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub question_id: QuestionId,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub seq: u64,
    pub force_algorithm: Option<AlgorithmKind>,
    pub requested_by: Option<AgentId>,
    /// Failed executions so far.
    pub attempts: u32,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest element, so "greater" means "served
        // first": higher priority, then earlier enqueue.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
