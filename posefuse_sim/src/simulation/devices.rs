// posefuse_sim/src/simulation/devices.rs

//! Synthetic tracking devices.
//!
//! Each emulator observes the ground truth through its own mounting pose and reports
//! in its own frame, with the failure modes real devices show: Gaussian noise, a
//! sample rate below the tracker loop (so stale values repeat bit-for-bit), random
//! quaternion sign flips and a linear heading drift.

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use posefuse_core::frames::yaw_rotation;
use posefuse_core::types::DeviceId;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::errors::SimError;
use crate::simulation::config::DeviceConfig;
use crate::simulation::core::{GroundTruthState, SimulationRng};

/// One reading as the device would hand it to a tracker, in the device's own frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSample {
    pub device: DeviceId,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    /// False when the device had nothing new and repeated its previous reading.
    pub fresh: bool,
}

pub struct EmulatedDevice {
    config: DeviceConfig,
    root_from_device: Isometry3<f64>,
    period: f64,
    since_last_sample: f64,
    elapsed: f64,
    started: bool,
    latest: Option<DeviceSample>,
    // Store noise distributions for each signal
    position_noise: Normal<f64>,
    rotation_noise: Normal<f64>,
}

impl EmulatedDevice {
    pub fn new(config: &DeviceConfig, section: &'static str) -> Result<Self, SimError> {
        config.validate(section)?;
        let invalid = |e: rand_distr::NormalError| SimError::InvalidParameter {
            name: section,
            reason: e.to_string(),
        };
        Ok(Self {
            config: config.clone(),
            root_from_device: config.mounting.to_isometry(),
            period: 1.0 / config.rate_hz,
            since_last_sample: 0.0,
            elapsed: 0.0,
            started: false,
            latest: None,
            position_noise: Normal::new(0.0, config.position_noise_stddev).map_err(invalid)?,
            rotation_noise: Normal::new(0.0, config.rotation_noise_stddev_deg.to_radians())
                .map_err(invalid)?,
        })
    }

    pub fn device(&self) -> DeviceId {
        self.config.device
    }

    pub fn confidence_limited(&self) -> bool {
        self.config.confidence_limited
    }

    /// The true device-to-root transform, i.e. what a perfect calibration would store.
    pub fn mounting(&self) -> Isometry3<f64> {
        self.root_from_device
    }

    /// Heading error the device has accumulated so far, in degrees.
    pub fn drift_degrees(&self) -> f64 {
        self.config.yaw_drift_deg_per_s * self.elapsed
    }

    /// Advances the device clock by `dt` and returns what it reports at `truth`.
    ///
    /// The first call always ticks; afterwards the device ticks once per period and
    /// repeats its previous reading in between. `None` means the device has lost the
    /// object until its next tick.
    pub fn sample(
        &mut self,
        truth: &GroundTruthState,
        dt: f64,
        rng: &mut SimulationRng,
    ) -> Option<DeviceSample> {
        self.elapsed += dt.max(0.0);
        self.since_last_sample += dt.max(0.0);

        if self.started {
            if self.since_last_sample < self.period {
                return self.latest.map(|latest| DeviceSample {
                    fresh: false,
                    ..latest
                });
            }
            self.since_last_sample -= self.period;
            // A long stall does not produce a burst of catch-up samples.
            if self.since_last_sample >= self.period {
                self.since_last_sample = 0.0;
            }
        } else {
            self.started = true;
            self.since_last_sample = 0.0;
        }

        if self.config.dropout_probability > 0.0 && rng.0.gen_bool(self.config.dropout_probability) {
            self.latest = None;
            return None;
        }

        let sample = self.observe(truth, rng);
        self.latest = Some(sample);
        self.latest
    }

    fn observe(&self, truth: &GroundTruthState, rng: &mut SimulationRng) -> DeviceSample {
        let rng = &mut rng.0;

        let position_root = truth.pose.translation.vector
            + Vector3::new(
                self.position_noise.sample(rng),
                self.position_noise.sample(rng),
                self.position_noise.sample(rng),
            );

        let jitter = UnitQuaternion::from_scaled_axis(Vector3::new(
            self.rotation_noise.sample(rng),
            self.rotation_noise.sample(rng),
            self.rotation_noise.sample(rng),
        ));
        let orientation_root = jitter * yaw_rotation(self.drift_degrees()) * truth.pose.rotation;

        let device_from_root = self.root_from_device.inverse();
        let position = device_from_root
            .transform_point(&Point3::from(position_root))
            .coords;
        let mut orientation = device_from_root.rotation * orientation_root;

        if self.config.sign_flip_probability > 0.0 && rng.gen_bool(self.config.sign_flip_probability) {
            orientation = UnitQuaternion::new_unchecked(-orientation.into_inner());
        }

        DeviceSample {
            device: self.config.device,
            position,
            orientation,
            fresh: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::{MotionConfig, Pose};
    use crate::simulation::core::ground_truth_at;
    use approx::assert_abs_diff_eq;
    use posefuse_core::frames::heading_degrees;

    fn quiet_device() -> DeviceConfig {
        DeviceConfig {
            device: DeviceId::WandTracker,
            rate_hz: 30.0,
            mounting: Pose {
                translation: [1.0, 0.0, 2.0],
                rotation_deg: [0.0, 90.0, 0.0],
            },
            position_noise_stddev: 0.0,
            rotation_noise_stddev_deg: 0.0,
            yaw_drift_deg_per_s: 0.0,
            sign_flip_probability: 0.0,
            dropout_probability: 0.0,
            confidence_limited: false,
        }
    }

    #[test]
    fn test_noiseless_reading_maps_back_through_mounting() {
        let mut device = EmulatedDevice::new(&quiet_device(), "test").unwrap();
        let mut rng = SimulationRng::new(Some(1));
        let truth = ground_truth_at(&MotionConfig::default(), 2.0);

        let sample = device.sample(&truth, 0.0, &mut rng).unwrap();
        let mounting = device.mounting();
        let back = mounting.transform_point(&Point3::from(sample.position)).coords;
        assert_abs_diff_eq!(back, truth.pose.translation.vector, epsilon = 1e-9);
        assert!((mounting.rotation * sample.orientation).angle_to(&truth.pose.rotation) < 1e-6);
    }

    #[test]
    fn test_lower_rate_repeats_identical_values() {
        let mut device = EmulatedDevice::new(&quiet_device(), "test").unwrap();
        let mut rng = SimulationRng::new(Some(1));
        let motion = MotionConfig::default();
        let dt = 1.0 / 90.0;

        let first = device.sample(&ground_truth_at(&motion, 0.0), dt, &mut rng).unwrap();
        let second = device.sample(&ground_truth_at(&motion, dt), dt, &mut rng).unwrap();
        assert!(first.fresh);
        assert!(!second.fresh);
        assert_eq!(first.position, second.position);
        assert_eq!(first.orientation, second.orientation);

        // 30 Hz against a 90 Hz loop: a fresh value every third step.
        let fresh = (2..92)
            .filter_map(|i| device.sample(&ground_truth_at(&motion, i as f64 * dt), dt, &mut rng))
            .filter(|s| s.fresh)
            .count();
        assert!((29..=31).contains(&fresh), "fresh samples: {fresh}");
    }

    #[test]
    fn test_drift_accumulates_linearly() {
        let mut config = quiet_device();
        config.yaw_drift_deg_per_s = 2.0;
        config.mounting = Pose::default();
        let mut device = EmulatedDevice::new(&config, "test").unwrap();
        let mut rng = SimulationRng::new(Some(3));
        let motion = MotionConfig {
            pitch_amplitude_deg: 0.0,
            angular_speed_deg: 0.0,
            ..MotionConfig::default()
        };

        let truth = ground_truth_at(&motion, 0.0);
        let mut last = device.sample(&truth, 0.0, &mut rng).unwrap();
        for _ in 0..50 {
            last = device.sample(&truth, 0.1, &mut rng).unwrap();
        }
        assert_abs_diff_eq!(device.drift_degrees(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            heading_degrees(&last.orientation) - heading_degrees(&truth.pose.rotation),
            10.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_certain_sign_flip_negates_the_quaternion() {
        let mut config = quiet_device();
        config.sign_flip_probability = 1.0;
        let mut flipping = EmulatedDevice::new(&config, "test").unwrap();
        let mut steady = EmulatedDevice::new(&quiet_device(), "test").unwrap();
        let mut rng = SimulationRng::new(Some(5));
        let truth = ground_truth_at(&MotionConfig::default(), 1.0);

        let a = flipping.sample(&truth, 0.0, &mut rng).unwrap().orientation;
        let b = steady.sample(&truth, 0.0, &mut rng).unwrap().orientation;
        assert_abs_diff_eq!(a.coords, -b.coords, epsilon = 1e-12);
    }

    #[test]
    fn test_dropout_lasts_until_the_next_tick() {
        let mut config = quiet_device();
        config.dropout_probability = 1.0;
        let mut device = EmulatedDevice::new(&config, "test").unwrap();
        let mut rng = SimulationRng::new(Some(9));
        let truth = ground_truth_at(&MotionConfig::default(), 0.0);
        for _ in 0..10 {
            assert!(device.sample(&truth, 0.01, &mut rng).is_none());
        }
    }

    #[test]
    fn test_invalid_probability_is_rejected() {
        let mut config = quiet_device();
        config.sign_flip_probability = -0.5;
        assert!(matches!(
            EmulatedDevice::new(&config, "drifting"),
            Err(SimError::InvalidParameter { name: "drifting", .. })
        ));
    }
}
