// posefuse_core/src/errors.rs

use crate::types::DeviceId;
use thiserror::Error;

/// Everything that can go wrong while writing or loading calibration data.
///
/// Missing calibration is deliberately absent: an uncalibrated pair resolves to
/// the identity transform.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("unknown device name '{0}'")]
    UnknownDevice(String),

    #[error("malformed device pair key '{0}', expected '<DeviceA>-<DeviceB>'")]
    MalformedPairKey(String),

    #[error("cannot calibrate device {0} against itself")]
    SelfPairing(DeviceId),

    #[error("transform {from} -> {to} is not invertible")]
    SingularTransform { from: DeviceId, to: DeviceId },

    #[error("rotation block of '{key}' is not orthonormal (deviation {deviation:.4})")]
    NonOrthonormalRotation { key: String, deviation: f64 },

    #[error("rotation block of '{key}' contains a reflection")]
    ReflectedRotation { key: String },

    #[error("floor normal of {0} is degenerate")]
    DegenerateFloorNormal(DeviceId),

    #[error("failed to parse calibration document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize calibration document: {0}")]
    Serialize(#[from] toml::ser::Error),
}
