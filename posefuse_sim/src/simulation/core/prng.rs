// posefuse_sim/src/simulation/core/prng.rs

use rand::rngs::OsRng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// A newtype wrapper around `ChaCha8Rng`.
/// This is the single, deterministic pseudo-random number generator for a run; every
/// emulated device draws from it in a fixed order, so a seed reproduces a run exactly.
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => {
                info!("No seed configured, seeding from the operating system");
                ChaCha8Rng::from_rng(OsRng).unwrap_or_else(|_| ChaCha8Rng::seed_from_u64(0))
            }
        };
        Self(rng)
    }
}
