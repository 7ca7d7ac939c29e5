// posefuse_core/src/types.rs

use std::fmt;
use std::str::FromStr;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::errors::CalibrationError;

// --- Core Identifier ---

/// Identifies a tracking device and therefore the coordinate frame it reports in.
///
/// Names are matched case-insensitively when parsed. `Custom1`/`Custom2` are reserved
/// for user-supplied devices and `None` is the "no device" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceId {
    DepthCamera1,
    DepthCamera2,
    WandTracker,
    HmdTracker,
    GenericTransform,
    Custom1,
    Custom2,
    #[default]
    None,
}

impl DeviceId {
    /// Every identifier, sentinel included.
    pub const ALL: [DeviceId; 8] = [
        DeviceId::DepthCamera1,
        DeviceId::DepthCamera2,
        DeviceId::WandTracker,
        DeviceId::HmdTracker,
        DeviceId::GenericTransform,
        DeviceId::Custom1,
        DeviceId::Custom2,
        DeviceId::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceId::DepthCamera1 => "DepthCamera1",
            DeviceId::DepthCamera2 => "DepthCamera2",
            DeviceId::WandTracker => "WandTracker",
            DeviceId::HmdTracker => "HmdTracker",
            DeviceId::GenericTransform => "GenericTransform",
            DeviceId::Custom1 => "Custom1",
            DeviceId::Custom2 => "Custom2",
            DeviceId::None => "None",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DeviceId::None)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CalibrationError::UnknownDevice(s.to_string()))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = CalibrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.as_str().to_string()
    }
}

/// An ordered `(from, to)` pair of devices. Serialized as `"<From>-<To>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePair {
    pub from: DeviceId,
    pub to: DeviceId,
}

impl DevicePair {
    pub fn new(from: DeviceId, to: DeviceId) -> Self {
        Self { from, to }
    }

    /// The same pair seen from the other side.
    pub fn mirrored(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for DevicePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

impl FromStr for DevicePair {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('-')
            .ok_or_else(|| CalibrationError::MalformedPairKey(s.to_string()))?;
        if to.contains('-') {
            return Err(CalibrationError::MalformedPairKey(s.to_string()));
        }
        Ok(Self {
            from: from.parse()?,
            to: to.parse()?,
        })
    }
}

// --- Frame Conversion ---

/// Optional steps applied on top of a pure frame change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertOptions {
    /// Level the target frame using its floor pitch correction.
    pub apply_floor_pitch: bool,
    /// Add the target device's distance from the floor to the vertical axis.
    pub apply_floor_height: bool,
    /// Extra rotation about world up, in degrees.
    pub yaw_offset_degrees: f64,
    /// Added last, locations only.
    pub position_offset: Vector3<f64>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            apply_floor_pitch: false,
            apply_floor_height: false,
            yaw_offset_degrees: 0.0,
            position_offset: Vector3::zeros(),
        }
    }
}

impl ConvertOptions {
    /// Both floor steps enabled, no offsets.
    pub fn floor_referenced() -> Self {
        Self {
            apply_floor_pitch: true,
            apply_floor_height: true,
            ..Self::default()
        }
    }
}

// --- Core Trait for Frame Lookups ---
// Trackers only see this contract. The calibration registry implements it,
// tests may substitute a mock.
pub trait FrameConverter {
    /// The master frame every tracker reports in.
    fn root(&self) -> DeviceId;

    /// Expresses a point measured by `device` in the frame of `target`.
    fn convert_location(
        &self,
        point: &Vector3<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64>;

    /// Expresses an orientation measured by `device` in the frame of `target`.
    fn convert_rotation(
        &self,
        rotation: &UnitQuaternion<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> UnitQuaternion<f64>;

    /// Expresses a free vector (velocity) measured by `device` in the frame of `target`.
    fn convert_velocity(
        &self,
        velocity: &Vector3<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64>;
}
