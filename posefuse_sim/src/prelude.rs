// posefuse_sim/src/prelude.rs

// Re-export the entire posefuse_core prelude so you can easily access
// pure types like `DeviceId`, `CalibrationRegistry`, `DriftCorrector`, etc.
pub use posefuse_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::errors::SimError;
pub use crate::simulation::config::{
    load_scenario, scenario_from_toml_str, DeviceConfig, FilterConfig, MotionConfig, Pose,
    ScenarioConfig,
};
pub use crate::simulation::core::{ground_truth_at, GroundTruthState, SimulationRng};
pub use crate::simulation::devices::{DeviceSample, EmulatedDevice};
pub use crate::simulation::runner::{run_scenario, HeadlessRun, RunReport};
pub use crate::simulation::tracker::{FusedPose, FusedTracker};
