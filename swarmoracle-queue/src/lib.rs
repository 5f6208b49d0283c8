//! # SwarmOracle Job Queue
//!
//! Priority scheduling for consensus runs. Jobs are ordered by priority
//! descending and enqueue time ascending, deduplicated to at most one
//! waiting-or-active job per question, executed by a fixed worker pool, and
//! retried with exponential backoff when the failure is transient. Terminal
//! outcomes stay queryable for a bounded retention window; there is no
//! durable job log beyond it.
//!
//! The queue is optional: configured with zero workers, triggers run the job
//! inline on the caller's task under the same dedup, retry, and event
//! contract.

mod job;
mod scheduler;

pub use job::{CalculationStatus, QueueStats, QueuedJob, TriggerOptions, TriggerReceipt};
pub use scheduler::{ConsensusScheduler, QueueConfig};
