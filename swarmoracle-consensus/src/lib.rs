//! # SwarmOracle Consensus Engine
//!
//! The scoring core of the SwarmOracle collective-intelligence service. One
//! engine call takes a question through the full pipeline:
//!
//! 1. **Evidence load** — a single read-consistent snapshot of the question,
//!    its answers with authoring agents, stakes, and debate rounds.
//! 2. **Weight calculation** — four independent signal vectors computed
//!    concurrently: semantic similarity (batched embeddings with a lexical
//!    fallback), reputation, stake share, and debate-critique impact.
//! 3. **Voting** — a deterministic selector picks one of three algorithms
//!    (reputation-weighted agreement, delegated proof of reputation, or the
//!    hybrid blend) and produces a ranked outcome.
//! 4. **Commit** — ranked weights, answer updates, a conditional question
//!    status advance, and an append-only audit row land in one transaction;
//!    the `consensus:calculated` event is published strictly afterwards.
//!
//! Failures map onto a five-kind taxonomy (validation, transient, logic,
//! conflict, cancelled); retry eligibility is a pure function of the kind.
//! The store, embedding provider, event bus, and clock are all
//! constructor-injected ports, so the engine runs unmodified over in-memory
//! doubles in tests.

pub mod algorithms;
mod clock;
mod engine;
mod error;
mod finalize;
mod loader;
#[cfg(test)]
pub(crate) mod testutil;
mod types;
pub mod weights;

pub use clock::{Clock, SystemClock};
pub use engine::{ConsensusConfig, ConsensusEngine, SettlementConfig};
pub use error::{ConsensusError, ErrorKind};
pub use finalize::finalize;
pub use loader::load_snapshot;
pub use types::{
    AlgorithmKind, AlgorithmResult, ConsensusRequest, RankedAnswer, SimilarityMatrix,
    SimilarityOutcome, WeightVectors,
};
pub use weights::SemanticOptions;
