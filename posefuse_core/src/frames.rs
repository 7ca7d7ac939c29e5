// posefuse_core/src/frames.rs

//! Axis conventions and Euler helpers shared by the filters and the registry.
//!
//! World up is +Y and forward is +Z. Euler angles are `(x: pitch, y: yaw, z: roll)`
//! in degrees, applied roll first, then pitch, then yaw (`q = Ry * Rx * Rz`), and
//! reported wrapped to `[0, 360)`.

use nalgebra::{UnitQuaternion, Vector2, Vector3};

/// Threshold on `|m12|` above which the pitch is treated as exactly ±90°.
const GIMBAL_LOCK_THRESHOLD: f64 = 0.999_999;

pub fn world_up() -> Vector3<f64> {
    Vector3::y()
}

pub fn world_forward() -> Vector3<f64> {
    Vector3::z()
}

/// Wraps an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Builds a rotation from `(pitch, yaw, roll)` Euler angles in degrees.
pub fn from_euler_degrees(euler: &Vector3<f64>) -> UnitQuaternion<f64> {
    let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), euler.y.to_radians());
    let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), euler.x.to_radians());
    let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), euler.z.to_radians());
    yaw * pitch * roll
}

/// Decomposes a rotation into `(pitch, yaw, roll)` Euler angles in degrees, each in `[0, 360)`.
///
/// At gimbal lock the roll is folded into the yaw and reported as zero.
pub fn euler_degrees(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    let m = rotation.to_rotation_matrix();
    let m = m.matrix();

    let sin_pitch = (-m[(1, 2)]).clamp(-1.0, 1.0);
    let pitch = sin_pitch.asin();

    let (yaw, roll) = if sin_pitch.abs() < GIMBAL_LOCK_THRESHOLD {
        (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
    } else {
        ((-m[(2, 0)]).atan2(m[(0, 0)]), 0.0)
    };

    Vector3::new(
        wrap_degrees(pitch.to_degrees()),
        wrap_degrees(yaw.to_degrees()),
        wrap_degrees(roll.to_degrees()),
    )
}

/// Heading of a rotation about world up, in degrees.
pub fn heading_degrees(rotation: &UnitQuaternion<f64>) -> f64 {
    euler_degrees(rotation).y
}

/// A pure rotation about world up.
pub fn yaw_rotation(yaw_degrees: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw_degrees.to_radians())
}

/// Keeps only the heading of a set of Euler angles.
pub fn yaw_only(euler: &Vector3<f64>) -> UnitQuaternion<f64> {
    yaw_rotation(euler.y)
}

/// Projects the forward axis of `rotation` onto the horizontal (XZ) plane.
///
/// The result is not normalized; its direction encodes the heading continuously.
pub fn horizontal_heading_vector(rotation: &UnitQuaternion<f64>) -> Vector2<f64> {
    let forward = rotation * world_forward();
    Vector2::new(forward.x, forward.z)
}

/// Inverse of [`horizontal_heading_vector`]: the yaw whose forward axis points along `v`.
pub fn heading_from_vector(v: &Vector2<f64>) -> f64 {
    wrap_degrees(v.x.atan2(v.y).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EPS: f64 = 1e-9;

    fn assert_euler_eq(a: &Vector3<f64>, b: &Vector3<f64>) {
        for i in 0..3 {
            let diff = (a[i] - b[i]).abs();
            assert!(
                diff < 1e-6 || (360.0 - diff) < 1e-6,
                "euler mismatch on axis {}: {:?} vs {:?}",
                i,
                a,
                b
            );
        }
    }

    #[test]
    fn test_wrap_degrees() {
        assert_abs_diff_eq!(wrap_degrees(-10.0), 350.0, epsilon = EPS);
        assert_abs_diff_eq!(wrap_degrees(720.0), 0.0, epsilon = EPS);
        assert_abs_diff_eq!(wrap_degrees(359.5), 359.5, epsilon = EPS);
        assert!(wrap_degrees(-1e-18) < 360.0);
    }

    #[test]
    fn test_euler_round_trip() {
        let samples = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(30.0, 45.0, 10.0),
            Vector3::new(330.0, 200.0, 350.0),
            Vector3::new(80.0, 120.0, 5.0),
            Vector3::new(275.0, 10.0, 180.0),
        ];
        for euler in &samples {
            let q = from_euler_degrees(euler);
            assert_euler_eq(&euler_degrees(&q), euler);
        }
    }

    #[test]
    fn test_gimbal_lock_folds_roll_into_yaw() {
        let q = from_euler_degrees(&Vector3::new(90.0, 30.0, 20.0));
        let euler = euler_degrees(&q);
        assert_abs_diff_eq!(euler.x, 90.0, epsilon = 1e-3);
        assert_abs_diff_eq!(euler.z, 0.0, epsilon = EPS);
        // The same rotation must be reproduced.
        assert!(from_euler_degrees(&euler).angle_to(&q) < 1e-3);
    }

    #[test]
    fn test_heading_vector_matches_yaw() {
        let q = yaw_rotation(90.0);
        let v = horizontal_heading_vector(&q);
        assert_abs_diff_eq!(v.x, 1.0, epsilon = EPS);
        assert_abs_diff_eq!(v.y, 0.0, epsilon = EPS);
        assert_abs_diff_eq!(heading_from_vector(&v), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(heading_degrees(&yaw_rotation(-45.0)), 315.0, epsilon = 1e-9);
    }
}
