// posefuse_sim/src/simulation/tracker.rs

use nalgebra::{UnitQuaternion, Vector3};
use posefuse_core::prelude::*;
use tracing::trace;

use crate::simulation::config::FilterConfig;
use crate::simulation::devices::DeviceSample;

/// The stabilized output of one tracker step, in the root frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedPose {
    pub position: Vector3<f64>,
    /// Drift-corrected orientation.
    pub rotation: UnitQuaternion<f64>,
    /// The filtered drifting orientation before heading correction.
    pub uncorrected_rotation: UnitQuaternion<f64>,
}

/// Fuses one logical tracked object.
///
/// Orientation comes from a drifting source (e.g. a headset) and is kept on heading
/// by a compass source (e.g. a depth camera), which also supplies the position.
/// Every raw reading is moved into the root frame through a [`FrameConverter`] before
/// it reaches a filter.
#[derive(Debug, Clone)]
pub struct FusedTracker {
    drifting_device: DeviceId,
    compass_device: DeviceId,
    options: ConvertOptions,
    correction_rate: f64,
    position: PositionFilter,
    drifting_rotation: RotationFilter,
    compass_rotation: RotationFilter,
    drift: DriftCorrector,
}

impl FusedTracker {
    pub fn new(drifting_device: DeviceId, compass_device: DeviceId, filters: &FilterConfig) -> Self {
        let cap = filters.identical_measurements_cap;
        let (position, drifting_rotation, compass_rotation) = if filters.skip_identical_measurements {
            (
                PositionFilter::with_identical_skip(filters.position_noise_covariance, cap),
                RotationFilter::with_identical_skip(filters.rotation_noise_covariance, cap),
                RotationFilter::with_identical_skip(filters.rotation_noise_covariance, cap),
            )
        } else {
            (
                PositionFilter::new(filters.position_noise_covariance),
                RotationFilter::new(filters.rotation_noise_covariance),
                RotationFilter::new(filters.rotation_noise_covariance),
            )
        };

        Self {
            drifting_device,
            compass_device,
            options: ConvertOptions::default(),
            correction_rate: filters.correction_rate,
            position,
            drifting_rotation,
            compass_rotation,
            drift: DriftCorrector::new(filters.drift_noise_covariance)
                .with_facing_forward_only(filters.facing_forward_only),
        }
    }

    /// Conversion steps applied on the way into the root frame.
    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn drift_corrector(&self) -> &DriftCorrector {
        &self.drift
    }

    /// Runs one tracker frame.
    ///
    /// `compass` is `None` when the compass device has lost the object; the heading
    /// correction then keeps its last value and the position is held.
    pub fn update(
        &mut self,
        frames: &dyn FrameConverter,
        drifting: &DeviceSample,
        compass: Option<&DeviceSample>,
        compass_confidence_limited: bool,
        dt: f64,
    ) -> FusedPose {
        debug_assert_eq!(drifting.device, self.drifting_device);
        let root = frames.root();

        let drifting_in_root =
            frames.convert_rotation(&drifting.orientation, drifting.device, root, &self.options);
        let uncorrected_rotation = self.drifting_rotation.update(&drifting_in_root, dt);

        let reading = match compass {
            Some(sample) => {
                debug_assert_eq!(sample.device, self.compass_device);
                let location =
                    frames.convert_location(&sample.position, sample.device, root, &self.options);
                self.position.update(&location, dt);

                let heading_in_root =
                    frames.convert_rotation(&sample.orientation, sample.device, root, &self.options);
                let filtered = self.compass_rotation.update(&heading_in_root, dt);
                Some(if compass_confidence_limited {
                    CompassReading::confidence_limited(filtered)
                } else {
                    CompassReading::new(filtered)
                })
            }
            None => {
                trace!(compass = %self.compass_device, "No compass reading this frame");
                None
            }
        };

        let rotation = self.drift.correct(
            &uncorrected_rotation,
            reading.as_ref(),
            dt,
            self.correction_rate,
        );

        FusedPose {
            position: self.position.estimate(),
            rotation,
            uncorrected_rotation,
        }
    }

    /// Forgets every filter's history and the heading correction.
    pub fn reset(&mut self) {
        SignalFilter::reset(&mut self.position);
        SignalFilter::reset(&mut self.drifting_rotation);
        SignalFilter::reset(&mut self.compass_rotation);
        self.drift.reset_correction();
    }
}
