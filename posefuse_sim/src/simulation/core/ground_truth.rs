// posefuse_sim/src/simulation/core/ground_truth.rs

use nalgebra::{Isometry3, Translation3, Vector3};
use posefuse_core::frames::{from_euler_degrees, wrap_degrees};

use crate::simulation::config::MotionConfig;

/// The true pose of the tracked object in the root frame at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruthState {
    pub time: f64,
    pub pose: Isometry3<f64>,
}

/// Evaluates the configured orbit at `time` seconds.
///
/// The object circles the root's vertical axis, always facing its direction of
/// travel, while its pitch nods sinusoidally.
pub fn ground_truth_at(motion: &MotionConfig, time: f64) -> GroundTruthState {
    let theta_deg = motion.angular_speed_deg * time;
    let theta = theta_deg.to_radians();
    let position = Vector3::new(
        motion.orbit_radius * theta.sin(),
        motion.height,
        motion.orbit_radius * theta.cos(),
    );

    // The tangent of the orbit leads the radius by a quarter turn.
    let lead = if motion.angular_speed_deg >= 0.0 { 90.0 } else { -90.0 };
    let yaw = wrap_degrees(theta_deg + lead);
    let pitch = wrap_degrees(
        motion.pitch_amplitude_deg
            * (2.0 * std::f64::consts::PI * motion.pitch_frequency_hz * time).sin(),
    );
    let rotation = from_euler_degrees(&Vector3::new(pitch, yaw, 0.0));

    GroundTruthState {
        time,
        pose: Isometry3::from_parts(Translation3::from(position), rotation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use posefuse_core::frames::{heading_degrees, world_forward};

    #[test]
    fn test_object_faces_its_direction_of_travel() {
        let motion = MotionConfig {
            pitch_amplitude_deg: 0.0,
            ..MotionConfig::default()
        };
        let dt = 1e-4;
        for t in [0.0, 3.0, 11.5] {
            let a = ground_truth_at(&motion, t);
            let b = ground_truth_at(&motion, t + dt);
            let travel = (b.pose.translation.vector - a.pose.translation.vector).normalize();
            let facing = a.pose.rotation * world_forward();
            assert_abs_diff_eq!(travel, facing, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_orbit_keeps_radius_and_height() {
        let motion = MotionConfig::default();
        let state = ground_truth_at(&motion, 7.3);
        let p = state.pose.translation.vector;
        assert_abs_diff_eq!(p.y, motion.height, epsilon = 1e-12);
        assert_abs_diff_eq!((p.x * p.x + p.z * p.z).sqrt(), motion.orbit_radius, epsilon = 1e-12);
        assert_abs_diff_eq!(
            heading_degrees(&ground_truth_at(&motion, 0.0).pose.rotation),
            90.0,
            epsilon = 1e-9
        );
    }
}
