// posefuse_sim/src/simulation/config/structs.rs

use std::path::PathBuf;

use nalgebra::{Isometry3, Translation3, Vector3};
use posefuse_core::estimation::filters::kalman::DEFAULT_IDENTICAL_MEASUREMENTS_CAP;
use posefuse_core::frames::from_euler_degrees;
use posefuse_core::types::DeviceId;
use serde::Deserialize;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # ScenarioConfig
/// Everything a headless run needs. This is the root of the data parsed from a
/// `scenario.toml` file; every section may be omitted and falls back to its default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: Simulation,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub motion: MotionConfig,

    #[serde(default = "DeviceConfig::default_drifting")]
    pub drifting: DeviceConfig,

    #[serde(default = "DeviceConfig::default_compass")]
    pub compass: DeviceConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            simulation: Simulation::default(),
            filters: FilterConfig::default(),
            motion: MotionConfig::default(),
            drifting: DeviceConfig::default_drifting(),
            compass: DeviceConfig::default_compass(),
        }
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    pub duration_seconds: f64,
    /// Rate of the fixed-step tracker loop.
    pub frame_rate_hz: f64,
    /// The master frame the fused pose is reported in.
    pub root_device: DeviceId,
    /// Persisted calibration to load. Without one, the registry is built from the
    /// emulated devices' true mounting poses.
    pub calibration_file: Option<PathBuf>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            duration_seconds: 30.0,
            frame_rate_hz: 60.0,
            root_device: DeviceId::DepthCamera1,
            calibration_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FilterConfig {
    pub position_noise_covariance: f64,
    pub rotation_noise_covariance: f64,
    pub drift_noise_covariance: f64,
    /// How quickly (1/s) the applied heading correction follows the filtered one.
    pub correction_rate: f64,
    pub facing_forward_only: bool,
    pub skip_identical_measurements: bool,
    pub identical_measurements_cap: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            position_noise_covariance: 10.0,
            rotation_noise_covariance: 1.0,
            drift_noise_covariance: 50.0,
            correction_rate: 2.0,
            facing_forward_only: false,
            skip_identical_measurements: true,
            identical_measurements_cap: DEFAULT_IDENTICAL_MEASUREMENTS_CAP,
        }
    }
}

/// The ground-truth trajectory: a horizontal orbit around the root origin, facing
/// along the direction of travel, with a slow pitch nod.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MotionConfig {
    pub orbit_radius: f64,
    pub height: f64,
    /// Degrees per second around the vertical axis.
    pub angular_speed_deg: f64,
    pub pitch_amplitude_deg: f64,
    pub pitch_frequency_hz: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            orbit_radius: 1.5,
            height: 1.2,
            angular_speed_deg: 15.0,
            pitch_amplitude_deg: 10.0,
            pitch_frequency_hz: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub device: DeviceId,
    /// Samples per second. Between samples the device keeps repeating its last value.
    pub rate_hz: f64,
    /// Where the device sits in the root frame (device frame to root frame).
    #[serde(default)]
    pub mounting: Pose,
    #[serde(default)]
    pub position_noise_stddev: f64,
    #[serde(default)]
    pub rotation_noise_stddev_deg: f64,
    /// Heading error accumulated per second, about the root's up axis.
    #[serde(default)]
    pub yaw_drift_deg_per_s: f64,
    /// Chance that a fresh sample reports the negated quaternion.
    #[serde(default)]
    pub sign_flip_probability: f64,
    /// Chance per device tick that the object is lost until the next tick.
    #[serde(default)]
    pub dropout_probability: f64,
    /// Only meaningful for the compass: its heading is unreliable when facing away.
    #[serde(default)]
    pub confidence_limited: bool,
}

impl DeviceConfig {
    pub fn default_drifting() -> Self {
        Self {
            device: DeviceId::HmdTracker,
            rate_hz: 90.0,
            mounting: Pose::default(),
            position_noise_stddev: 0.0,
            rotation_noise_stddev_deg: 0.2,
            yaw_drift_deg_per_s: 1.0,
            sign_flip_probability: 0.02,
            dropout_probability: 0.0,
            confidence_limited: false,
        }
    }

    pub fn default_compass() -> Self {
        Self {
            device: DeviceId::DepthCamera1,
            rate_hz: 30.0,
            mounting: Pose::default(),
            position_noise_stddev: 0.01,
            rotation_noise_stddev_deg: 2.0,
            yaw_drift_deg_per_s: 0.0,
            sign_flip_probability: 0.0,
            dropout_probability: 0.05,
            confidence_limited: true,
        }
    }
}

// =========================================================================
// == Helper Structs for Nested Configuration ==
// =========================================================================

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Pose {
    pub translation: [f64; 3],
    /// `[pitch, yaw, roll]` in degrees.
    pub rotation_deg: [f64; 3],
}

impl Pose {
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(Vector3::from(self.translation)),
            from_euler_degrees(&Vector3::from(self.rotation_deg)),
        )
    }
}
