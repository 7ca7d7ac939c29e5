// posefuse_core/src/calibration/orthonormal.rs

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::errors::CalibrationError;

/// Largest `||R^T R - I||_F` accepted for a persisted rotation block. Anything worse is
/// malformed data rather than rounding noise.
pub const ORTHONORMAL_TOLERANCE: f64 = 0.1;

/// Frobenius distance of `m^T m` from the identity.
pub fn orthonormality_deviation(m: &Matrix3<f64>) -> f64 {
    (m.transpose() * m - Matrix3::identity()).norm()
}

/// Orthonormalizes the columns of `m` with modified Gram-Schmidt.
///
/// Each column is projected against the already-orthonormal ones one at a time,
/// which keeps rounding error from accumulating. Returns `None` if the columns are
/// linearly dependent.
pub fn gram_schmidt(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let mut basis: [Vector3<f64>; 3] = [Vector3::zeros(); 3];

    for i in 0..3 {
        let mut v: Vector3<f64> = m.column(i).into_owned();
        for b in basis.iter().take(i) {
            let projection = b * b.dot(&v);
            v -= projection;
        }
        basis[i] = v.try_normalize(1e-9)?;
    }

    Some(Matrix3::from_columns(&basis))
}

/// Turns a raw 3x3 rotation block into a unit quaternion.
///
/// The block is validated (near-orthonormal, no reflection) and orthonormalized first.
/// `key` names the block in error messages.
pub fn rotation_from_block(
    block: &Matrix3<f64>,
    key: &str,
) -> Result<UnitQuaternion<f64>, CalibrationError> {
    let deviation = orthonormality_deviation(block);
    if !deviation.is_finite() || deviation > ORTHONORMAL_TOLERANCE {
        return Err(CalibrationError::NonOrthonormalRotation {
            key: key.to_string(),
            deviation,
        });
    }

    let orthonormal = gram_schmidt(block).ok_or_else(|| CalibrationError::NonOrthonormalRotation {
        key: key.to_string(),
        deviation,
    })?;
    if orthonormal.determinant() < 0.0 {
        return Err(CalibrationError::ReflectedRotation {
            key: key.to_string(),
        });
    }

    let rotation = Rotation3::from_matrix_unchecked(orthonormal);
    Ok(UnitQuaternion::from_rotation_matrix(&rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gram_schmidt_repairs_small_skew() {
        let exact = *UnitQuaternion::from_euler_angles(0.1, 0.4, -0.3)
            .to_rotation_matrix()
            .matrix();
        let mut noisy = exact;
        noisy[(0, 1)] += 1e-3;
        noisy[(2, 0)] -= 2e-3;
        noisy[(1, 2)] += 5e-4;

        let fixed = gram_schmidt(&noisy).unwrap();
        assert!(orthonormality_deviation(&fixed) < 1e-12);
        assert_abs_diff_eq!(fixed, exact, epsilon = 5e-3);
    }

    #[test]
    fn test_rotation_from_block_matches_source() {
        let q = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.2);
        let block = *q.to_rotation_matrix().matrix();
        let recovered = rotation_from_block(&block, "test").unwrap();
        assert!(recovered.angle_to(&q) < 1e-6);
    }

    #[test]
    fn test_far_from_orthonormal_is_rejected() {
        let block = Matrix3::new(2.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            rotation_from_block(&block, "DepthCamera1-WandTracker"),
            Err(CalibrationError::NonOrthonormalRotation { key, .. }) if key == "DepthCamera1-WandTracker"
        ));
    }

    #[test]
    fn test_reflection_is_rejected() {
        let block = Matrix3::new(-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            rotation_from_block(&block, "k"),
            Err(CalibrationError::ReflectedRotation { .. })
        ));
    }

    #[test]
    fn test_dependent_columns() {
        let block = Matrix3::new(1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(gram_schmidt(&block).is_none());
    }
}
