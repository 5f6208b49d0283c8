//! The consensus job scheduler: priority queue, dedup, retries, and the
//! worker pool.
//!
//! At most one job per question is ever waiting or active; a second trigger
//! while one exists returns the existing job id. Transient failures
//! re-enqueue with exponential backoff up to the attempt cap; every other
//! failure terminates the job and publishes `consensus:failed`.
//!
//! The queue is an optional capability: with `workers = 0` a trigger
//! executes the job inline on the caller's task with the same retry and
//! event contract.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use swarmoracle_consensus::{ConsensusEngine, ConsensusError, ConsensusRequest};
use swarmoracle_events::{EventBus, SwarmEvent};
use swarmoracle_storage::QuestionId;

use crate::job::{CalculationStatus, QueueStats, QueuedJob, TriggerOptions, TriggerReceipt};

/// Configuration for the job queue and worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Worker pool size; `0` disables the queue and executes triggers
    /// inline on the caller's task.
    pub workers: usize,

    /// Total executions allowed per job, including the first.
    pub max_attempts: u32,

    /// Base of the exponential retry backoff (`base · 2^attempts`).
    pub backoff_base: Duration,

    /// How long terminal job records stay queryable.
    pub retention: Duration,

    /// Per-job duration estimate used for trigger receipts.
    pub estimated_job_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            retention: Duration::from_secs(3600),
            estimated_job_ms: 1500,
        }
    }
}

/// One question's entry in the dedup index, covering waiting and active.
struct InFlightEntry {
    job_id: Uuid,
    running: bool,
    cancel: CancellationToken,
}

/// Terminal outcome retained for the configured window.
struct TerminalRecord {
    status: CalculationStatus,
    recorded: Instant,
}

struct SchedulerInner {
    config: QueueConfig,
    engine: Arc<ConsensusEngine>,
    bus: EventBus,
    heap: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    in_flight: DashMap<QuestionId, InFlightEntry>,
    terminal: DashMap<QuestionId, TerminalRecord>,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    seq: AtomicU64,
    shutdown: CancellationToken,
}

/// Priority scheduler for consensus jobs.
#[derive(Clone)]
pub struct ConsensusScheduler {
    inner: Arc<SchedulerInner>,
}

impl ConsensusScheduler {
    pub fn new(config: QueueConfig, engine: Arc<ConsensusEngine>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                engine,
                bus,
                heap: Mutex::new(BinaryHeap::new()),
                notify: Notify::new(),
                in_flight: DashMap::new(),
                terminal: DashMap::new(),
                completed_total: AtomicU64::new(0),
                failed_total: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start the worker pool. A no-op in inline mode.
    pub fn start(&self) {
        for worker in 0..self.inner.config.workers {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                debug!(worker, "consensus worker started");
                worker_loop(inner).await;
                debug!(worker, "consensus worker stopped");
            });
        }
        if self.inner.config.workers > 0 {
            info!(workers = self.inner.config.workers, "consensus scheduler started");
        } else {
            info!("consensus scheduler in inline mode, no workers spawned");
        }
    }

    /// Stop accepting work and cancel everything in flight.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
        for entry in self.inner.in_flight.iter() {
            entry.cancel.cancel();
        }
        self.inner.notify.notify_waiters();
        info!("consensus scheduler stopped");
    }

    /// Request a consensus run for a question.
    ///
    /// Deduplicated per question: while a job is waiting or active, further
    /// triggers return its id and current state.
    pub async fn trigger(
        &self,
        question_id: QuestionId,
        options: TriggerOptions,
    ) -> TriggerReceipt {
        // Fast path: an existing waiting or active job wins.
        if let Some(entry) = self.inner.in_flight.get(&question_id) {
            let status = if entry.running {
                CalculationStatus::Active
            } else {
                CalculationStatus::Queued
            };
            return TriggerReceipt {
                job_id: entry.job_id,
                status,
                estimated_ms: self.estimate_ms(),
            };
        }

        let job = QueuedJob {
            job_id: Uuid::new_v4(),
            question_id,
            priority: options.priority,
            enqueued_at: Utc::now(),
            seq: self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed),
            force_algorithm: options.force_algorithm,
            requested_by: options.requested_by,
            attempts: 0,
        };

        if self.inner.config.workers == 0 {
            return self.run_inline(job).await;
        }

        let job_id = job.job_id;
        // The entry guard write-locks its shard; resolve and release it
        // before estimate_ms walks the map.
        let (winner_job_id, status) = match self.inner.in_flight.entry(question_id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                // Lost the race to a concurrent trigger.
                let status = if existing.get().running {
                    CalculationStatus::Active
                } else {
                    CalculationStatus::Queued
                };
                (existing.get().job_id, status)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(InFlightEntry {
                    job_id,
                    running: false,
                    cancel: CancellationToken::new(),
                });
                self.inner.heap.lock().push(job);
                self.inner.notify.notify_one();
                debug!(question_id = %question_id, job_id = %job_id, "consensus job queued");
                (job_id, CalculationStatus::Queued)
            }
        };
        TriggerReceipt {
            job_id: winner_job_id,
            status,
            estimated_ms: self.estimate_ms(),
        }
    }

    /// Observable calculation state for a question.
    pub fn status(&self, question_id: QuestionId) -> CalculationStatus {
        if let Some(entry) = self.inner.in_flight.get(&question_id) {
            return if entry.running {
                CalculationStatus::Active
            } else {
                CalculationStatus::Queued
            };
        }
        if let Some(record) = self.inner.terminal.get(&question_id) {
            if record.recorded.elapsed() < self.inner.config.retention {
                return record.status.clone();
            }
        }
        // Expired records are pruned on observation.
        self.inner
            .terminal
            .remove_if(&question_id, |_, record| {
                record.recorded.elapsed() >= self.inner.config.retention
            });
        CalculationStatus::Idle
    }

    /// Cancel the in-flight job for a question, if any.
    pub fn cancel(&self, question_id: QuestionId) -> bool {
        match self.inner.in_flight.get(&question_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> QueueStats {
        let waiting = self.inner.heap.lock().len();
        let active = self
            .inner
            .in_flight
            .iter()
            .filter(|entry| entry.running)
            .count();
        QueueStats {
            waiting,
            active,
            completed: self.inner.completed_total.load(AtomicOrdering::Relaxed),
            failed: self.inner.failed_total.load(AtomicOrdering::Relaxed),
        }
    }

    fn estimate_ms(&self) -> u64 {
        let depth = self.inner.heap.lock().len()
            + self
                .inner
                .in_flight
                .iter()
                .filter(|entry| entry.running)
                .count();
        (depth as u64 + 1) * self.inner.config.estimated_job_ms
    }

    /// Inline execution path for queue-less deployments: same dedup, retry,
    /// and event contract, but on the caller's task.
    async fn run_inline(&self, mut job: QueuedJob) -> TriggerReceipt {
        let question_id = job.question_id;
        let cancel = CancellationToken::new();
        self.inner.in_flight.insert(
            question_id,
            InFlightEntry {
                job_id: job.job_id,
                running: true,
                cancel: cancel.clone(),
            },
        );

        let status = loop {
            let request = ConsensusRequest {
                job_id: job.job_id,
                question_id,
                force_algorithm: job.force_algorithm,
                requested_by: job.requested_by,
            };
            match self.inner.engine.execute(&request, &cancel).await {
                Ok(_) => break record_success(&self.inner, question_id),
                Err(err) => {
                    job.attempts += 1;
                    if should_retry(&self.inner, &err, job.attempts) {
                        publish_failure(&self.inner, question_id, &err, false);
                        tokio::time::sleep(backoff_for(&self.inner.config, job.attempts)).await;
                    } else {
                        break record_failure(&self.inner, question_id, &err);
                    }
                }
            }
        };

        self.inner.in_flight.remove(&question_id);
        TriggerReceipt {
            job_id: job.job_id,
            status,
            estimated_ms: 0,
        }
    }
}

fn backoff_for(config: &QueueConfig, attempts: u32) -> Duration {
    config.backoff_base * 2u32.saturating_pow(attempts)
}

fn should_retry(inner: &SchedulerInner, err: &ConsensusError, attempts: u32) -> bool {
    err.retryable() && attempts < inner.config.max_attempts && !inner.shutdown.is_cancelled()
}

fn publish_failure(
    inner: &SchedulerInner,
    question_id: QuestionId,
    err: &ConsensusError,
    permanent: bool,
) {
    inner.bus.publish(SwarmEvent::ConsensusFailed {
        question_id,
        reason: err.reason().to_string(),
        permanent,
    });
}

fn record_success(inner: &SchedulerInner, question_id: QuestionId) -> CalculationStatus {
    let status = CalculationStatus::Completed { at: Utc::now() };
    insert_terminal(inner, question_id, status.clone());
    inner.completed_total.fetch_add(1, AtomicOrdering::Relaxed);
    status
}

fn record_failure(
    inner: &SchedulerInner,
    question_id: QuestionId,
    err: &ConsensusError,
) -> CalculationStatus {
    publish_failure(inner, question_id, err, true);
    let status = CalculationStatus::Failed {
        reason: err.reason().to_string(),
    };
    insert_terminal(inner, question_id, status.clone());
    inner.failed_total.fetch_add(1, AtomicOrdering::Relaxed);
    warn!(question_id = %question_id, reason = err.reason(), "consensus job failed permanently");
    status
}

fn insert_terminal(inner: &SchedulerInner, question_id: QuestionId, status: CalculationStatus) {
    // Opportunistically sweep expired records while we are writing anyway.
    let retention = inner.config.retention;
    inner
        .terminal
        .retain(|_, record| record.recorded.elapsed() < retention);
    inner.terminal.insert(
        question_id,
        TerminalRecord {
            status,
            recorded: Instant::now(),
        },
    );
}

async fn worker_loop(inner: Arc<SchedulerInner>) {
    loop {
        if inner.shutdown.is_cancelled() {
            return;
        }

        let job = { inner.heap.lock().pop() };
        let mut job = match job {
            Some(job) => job,
            None => {
                tokio::select! {
                    _ = inner.notify.notified() => continue,
                    _ = inner.shutdown.cancelled() => return,
                }
            }
        };

        let cancel = match inner.in_flight.get_mut(&job.question_id) {
            Some(mut entry) => {
                entry.running = true;
                entry.cancel.clone()
            }
            // Entry lost (cancelled scheduler teardown); run detached so the
            // job still resolves.
            None => CancellationToken::new(),
        };

        let request = ConsensusRequest {
            job_id: job.job_id,
            question_id: job.question_id,
            force_algorithm: job.force_algorithm,
            requested_by: job.requested_by,
        };

        match inner.engine.execute(&request, &cancel).await {
            Ok(_) => {
                record_success(&inner, job.question_id);
                inner.in_flight.remove(&job.question_id);
            }
            Err(err) => {
                job.attempts += 1;
                if should_retry(&inner, &err, job.attempts) {
                    publish_failure(&inner, job.question_id, &err, false);
                    if let Some(mut entry) = inner.in_flight.get_mut(&job.question_id) {
                        entry.running = false;
                    }
                    let backoff = backoff_for(&inner.config, job.attempts);
                    debug!(
                        question_id = %job.question_id,
                        attempts = job.attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure, re-enqueueing with backoff"
                    );
                    let requeue = Arc::clone(&inner);
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        if requeue.shutdown.is_cancelled() {
                            requeue.in_flight.remove(&job.question_id);
                            return;
                        }
                        requeue.heap.lock().push(job);
                        requeue.notify.notify_one();
                    });
                } else {
                    record_failure(&inner, job.question_id, &err);
                    inner.in_flight.remove(&job.question_id);
                }
            }
        }
    }
}
