//! The four weight calculators. Each is a pure function of the snapshot;
//! only the semantic calculator touches the network, and it degrades to a
//! lexical fallback rather than failing. The engine runs all four
//! concurrently and joins them into a [`WeightVectors`].

mod debate;
mod reputation;
mod semantic;
mod stake;

pub use debate::debate_weights;
pub use reputation::reputation_weights;
pub use semantic::{compute_similarity, SemanticOptions};
pub use stake::stake_weights;
