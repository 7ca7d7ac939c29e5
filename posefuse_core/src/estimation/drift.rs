// posefuse_core/src/estimation/drift.rs

//! Yaw drift correction.
//!
//! An orientation source without an absolute heading reference (an inertial sensor,
//! a head-mounted display) slowly loses its yaw. [`DriftCorrector`] keeps it aligned
//! with a "compass": any other source whose heading does not drift. Only the heading
//! is touched; pitch and roll of the drifting source are trusted as-is.

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use tracing::debug;

use crate::estimation::filters::kalman::KalmanCore;
use crate::frames::{
    euler_degrees, from_euler_degrees, heading_degrees, heading_from_vector,
    horizontal_heading_vector, world_forward, wrap_degrees, yaw_only, yaw_rotation,
};

/// Lower edge of the pitch band (degrees) where yaw is ill-conditioned.
pub const POLE_BAND_LOWER_DEGREES: f64 = 60.0;
/// Upper edge of the pitch band (degrees) where yaw is ill-conditioned.
pub const POLE_BAND_UPPER_DEGREES: f64 = 300.0;
/// Pitches within this distance of an edge count as on the edge. An Euler
/// decomposition of an exact 60 degrees can land a few ulps short of it.
pub const POLE_BAND_EDGE_TOLERANCE_DEGREES: f64 = 1e-9;

/// `true` when a pitch (Euler x, degrees in `[0, 360)`) is far enough from vertical
/// for its heading to be meaningful. Both edges belong to the band.
pub fn is_outside_pole_band(pitch_degrees: f64) -> bool {
    pitch_degrees < POLE_BAND_LOWER_DEGREES - POLE_BAND_EDGE_TOLERANCE_DEGREES
        || pitch_degrees > POLE_BAND_UPPER_DEGREES + POLE_BAND_EDGE_TOLERANCE_DEGREES
}

/// A heading reference sample.
#[derive(Debug, Clone, Copy)]
pub struct CompassReading {
    /// Orientation of the compass source, already filtered and in the drifting source's frame.
    pub orientation: UnitQuaternion<f64>,
    /// Set for sources whose orientation is only trustworthy in some poses,
    /// e.g. a body-tracking joint seen by a depth camera.
    pub confidence_limited: bool,
}

impl CompassReading {
    pub fn new(orientation: UnitQuaternion<f64>) -> Self {
        Self {
            orientation,
            confidence_limited: false,
        }
    }

    pub fn confidence_limited(orientation: UnitQuaternion<f64>) -> Self {
        Self {
            orientation,
            confidence_limited: true,
        }
    }
}

/// Fuses a drifting orientation with a compass heading.
///
/// The heading difference between the two is tracked as a 2D unit-circle vector by a
/// 2-state Kalman filter (so it stays continuous across the 0/360 seam), then blended
/// into the applied correction at a caller-controlled rate.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    filter: KalmanCore<2>,
    noise_covariance: f64,
    facing_forward_only: bool,
    filtered_yaw_difference: UnitQuaternion<f64>,
    final_yaw_difference: UnitQuaternion<f64>,
}

impl DriftCorrector {
    pub fn new(noise_covariance: f64) -> Self {
        Self {
            filter: KalmanCore::new(),
            noise_covariance,
            facing_forward_only: false,
            filtered_yaw_difference: UnitQuaternion::identity(),
            final_yaw_difference: UnitQuaternion::identity(),
        }
    }

    /// Only accept confidence-limited compass samples while the compass source faces forward.
    pub fn with_facing_forward_only(mut self, enabled: bool) -> Self {
        self.facing_forward_only = enabled;
        self
    }

    pub fn set_facing_forward_only(&mut self, enabled: bool) {
        self.facing_forward_only = enabled;
    }

    pub fn set_noise_covariance(&mut self, noise_covariance: f64) {
        self.noise_covariance = noise_covariance;
    }

    /// The Kalman-filtered heading difference `drifting - compass`.
    pub fn filtered_yaw_difference(&self) -> UnitQuaternion<f64> {
        self.filtered_yaw_difference
    }

    /// The heading difference currently removed from the drifting orientation.
    pub fn final_yaw_difference(&self) -> UnitQuaternion<f64> {
        self.final_yaw_difference
    }

    /// Returns `drifting` with its heading corrected towards the compass.
    ///
    /// `correction_rate` (1/s) sets how quickly the applied correction follows the
    /// filtered difference; zero freezes it.
    pub fn correct(
        &mut self,
        drifting: &UnitQuaternion<f64>,
        compass: Option<&CompassReading>,
        dt: f64,
        correction_rate: f64,
    ) -> UnitQuaternion<f64> {
        let drifting_euler = euler_degrees(drifting);

        if let Some(compass) = compass {
            self.track_difference(&drifting_euler, compass, dt);
        }

        let blend = (dt * correction_rate).clamp(0.0, 1.0);
        if blend > 0.0 {
            self.final_yaw_difference = self
                .final_yaw_difference
                .try_slerp(&self.filtered_yaw_difference, blend, 1e-9)
                .unwrap_or_else(|| {
                    self.final_yaw_difference
                        .nlerp(&self.filtered_yaw_difference, blend)
                });
        }

        let heading = wrap_degrees(drifting_euler.y - heading_degrees(&self.final_yaw_difference));
        from_euler_degrees(&Vector3::new(drifting_euler.x, heading, drifting_euler.z))
    }

    /// Forgets the tracked difference, e.g. after the user re-zeroes the drifting sensor.
    pub fn reset_correction(&mut self) {
        self.filter.reset();
        self.filtered_yaw_difference = UnitQuaternion::identity();
        self.final_yaw_difference = UnitQuaternion::identity();
    }

    fn track_difference(&mut self, drifting_euler: &Vector3<f64>, compass: &CompassReading, dt: f64) {
        let compass_euler = euler_degrees(&compass.orientation);
        if !is_outside_pole_band(drifting_euler.x) || !is_outside_pole_band(compass_euler.x) {
            debug!(
                drifting_pitch = drifting_euler.x,
                compass_pitch = compass_euler.x,
                "Pitch inside the pole band, keeping previous yaw difference"
            );
            return;
        }

        let compass_yaw = yaw_only(&compass_euler);
        if self.facing_forward_only && compass.confidence_limited {
            let facing = compass_yaw * world_forward();
            if facing.z < 0.0 {
                return;
            }
        }

        let drifting_yaw = yaw_only(drifting_euler);
        let difference = drifting_yaw * compass_yaw.inverse();
        let heading_vector: Vector2<f64> = horizontal_heading_vector(&difference);

        let filtered = self.filter.filter(&heading_vector, dt, self.noise_covariance);
        self.filtered_yaw_difference = yaw_rotation(heading_from_vector(&filtered));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::from_euler_degrees;
    use approx::assert_abs_diff_eq;

    const DT: f64 = 0.02;

    fn heading_error(a: f64, b: f64) -> f64 {
        let d = wrap_degrees(a - b);
        d.min(360.0 - d)
    }

    #[test]
    fn test_pole_band_edges() {
        assert!(is_outside_pole_band(0.0));
        assert!(is_outside_pole_band(59.999));
        assert!(!is_outside_pole_band(60.0));
        assert!(!is_outside_pole_band(59.99999999999998));
        assert!(!is_outside_pole_band(300.00000000000006));
        assert!(!is_outside_pole_band(180.0));
        assert!(!is_outside_pole_band(300.0));
        assert!(is_outside_pole_band(300.001));
        assert!(is_outside_pole_band(359.0));
    }

    #[test]
    fn test_converges_to_compass_heading() {
        let mut corrector = DriftCorrector::new(1.0);
        let drifting = from_euler_degrees(&Vector3::new(10.0, 40.0, 5.0));
        let compass = CompassReading::new(from_euler_degrees(&Vector3::new(0.0, 10.0, 0.0)));

        let mut out = drifting;
        for _ in 0..500 {
            out = corrector.correct(&drifting, Some(&compass), DT, 5.0);
        }
        let euler = euler_degrees(&out);
        assert!(heading_error(euler.y, 10.0) < 0.1, "heading {}", euler.y);
        // Pitch and roll of the drifting source are untouched.
        assert_abs_diff_eq!(euler.x, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(euler.z, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_correction_is_continuous_across_the_seam() {
        let mut corrector = DriftCorrector::new(1.0);
        let drifting = from_euler_degrees(&Vector3::new(0.0, 355.0, 0.0));
        let compass = CompassReading::new(from_euler_degrees(&Vector3::new(0.0, 5.0, 0.0)));

        for _ in 0..500 {
            corrector.correct(&drifting, Some(&compass), DT, 5.0);
        }
        // 355 - 5 = -10 degrees of drift.
        let diff = heading_degrees(&corrector.final_yaw_difference());
        assert!(heading_error(diff, 350.0) < 0.1, "difference {}", diff);
    }

    #[test]
    fn test_zero_rate_never_moves_final_difference() {
        let mut corrector = DriftCorrector::new(1.0);
        let drifting = from_euler_degrees(&Vector3::new(0.0, 90.0, 0.0));
        for yaw in [0.0, 45.0, 180.0, 270.0] {
            let compass = CompassReading::new(from_euler_degrees(&Vector3::new(0.0, yaw, 0.0)));
            let out = corrector.correct(&drifting, Some(&compass), DT, 0.0);
            assert_eq!(corrector.final_yaw_difference(), UnitQuaternion::identity());
            assert!(out.angle_to(&drifting) < 1e-6);
        }
        // The filtered difference did move.
        assert!(corrector.filtered_yaw_difference().angle() > 0.1);
    }

    #[test]
    fn test_pole_band_freezes_filtered_difference() {
        let compass = CompassReading::new(from_euler_degrees(&Vector3::new(0.0, 30.0, 0.0)));

        for (pitch, should_track) in [
            (0.0, true),
            (59.0, true),
            (60.0, false),
            (61.0, false),
            (299.0, false),
            (300.0, false),
            (301.0, true),
            (359.0, true),
        ] {
            let mut corrector = DriftCorrector::new(1.0);
            let drifting = from_euler_degrees(&Vector3::new(pitch, 90.0, 0.0));
            corrector.correct(&drifting, Some(&compass), DT, 1.0);
            let tracked = corrector.filtered_yaw_difference().angle() > 1e-6;
            assert_eq!(tracked, should_track, "pitch {}", pitch);
        }
    }

    #[test]
    fn test_compass_inside_pole_band_is_ignored() {
        let mut corrector = DriftCorrector::new(1.0);
        let drifting = from_euler_degrees(&Vector3::new(0.0, 90.0, 0.0));
        let compass = CompassReading::new(from_euler_degrees(&Vector3::new(85.0, 30.0, 0.0)));
        corrector.correct(&drifting, Some(&compass), DT, 1.0);
        assert_eq!(corrector.filtered_yaw_difference(), UnitQuaternion::identity());
    }

    #[test]
    fn test_facing_forward_gate() {
        let drifting = from_euler_degrees(&Vector3::new(0.0, 90.0, 0.0));
        let facing_away =
            CompassReading::confidence_limited(from_euler_degrees(&Vector3::new(0.0, 170.0, 0.0)));

        let mut gated = DriftCorrector::new(1.0).with_facing_forward_only(true);
        gated.correct(&drifting, Some(&facing_away), DT, 1.0);
        assert_eq!(gated.filtered_yaw_difference(), UnitQuaternion::identity());

        let mut ungated = DriftCorrector::new(1.0);
        ungated.correct(&drifting, Some(&facing_away), DT, 1.0);
        assert!(ungated.filtered_yaw_difference().angle() > 0.1);

        // A fully trusted compass is never gated.
        let trusted = CompassReading::new(facing_away.orientation);
        gated.correct(&drifting, Some(&trusted), DT, 1.0);
        assert!(gated.filtered_yaw_difference().angle() > 0.1);
    }

    #[test]
    fn test_missing_compass_keeps_applying_last_correction() {
        let mut corrector = DriftCorrector::new(1.0);
        let drifting = from_euler_degrees(&Vector3::new(0.0, 50.0, 0.0));
        let compass = CompassReading::new(from_euler_degrees(&Vector3::new(0.0, 20.0, 0.0)));
        for _ in 0..300 {
            corrector.correct(&drifting, Some(&compass), DT, 10.0);
        }
        let out = corrector.correct(&drifting, None, DT, 10.0);
        assert!(heading_error(heading_degrees(&out), 20.0) < 0.1);
    }

    #[test]
    fn test_reset_correction() {
        let mut corrector = DriftCorrector::new(1.0);
        let drifting = from_euler_degrees(&Vector3::new(0.0, 50.0, 0.0));
        let compass = CompassReading::new(from_euler_degrees(&Vector3::new(0.0, 20.0, 0.0)));
        for _ in 0..50 {
            corrector.correct(&drifting, Some(&compass), DT, 10.0);
        }
        corrector.reset_correction();
        assert_eq!(corrector.final_yaw_difference(), UnitQuaternion::identity());
        assert_eq!(corrector.filtered_yaw_difference(), UnitQuaternion::identity());
        let out = corrector.correct(&drifting, None, DT, 10.0);
        assert!(out.angle_to(&drifting) < 1e-6);
    }
}
