// posefuse_sim/src/simulation/core/mod.rs

pub mod ground_truth;
pub mod prng;

pub use ground_truth::{ground_truth_at, GroundTruthState};
pub use prng::SimulationRng;
