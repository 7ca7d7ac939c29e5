// posefuse_core/src/calibration/document.rs

//! The persisted form of a [`CalibrationRegistry`].
//!
//! Reading and writing files is left to the caller; this module only maps between the
//! registry and its serializable document, and between the document and TOML text.
//!
//! ```toml
//! RootDevice = "DepthCamera1"
//!
//! [Transforms.WandTracker-DepthCamera1]
//! x = 0.1
//! y = 0.0
//! z = 1.2
//! r00 = 1.0
//! r01 = 0.0
//! # ... r02 through r22, row-major
//!
//! [FloorData.DepthCamera1]
//! normal = { x = 0.0, y = 0.94, z = -0.34 }
//! distanceFromFloor = 1.1
//! ```

use std::collections::BTreeMap;

use nalgebra::{Isometry3, Matrix3, Translation3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::orthonormal::rotation_from_block;
use crate::calibration::registry::CalibrationRegistry;
use crate::errors::CalibrationError;
use crate::types::{DeviceId, DevicePair};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct CalibrationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_device: Option<String>,
    /// Keyed by `"<DeviceA>-<DeviceB>"`.
    #[serde(default)]
    pub transforms: BTreeMap<String, TransformEntry>,
    /// Keyed by device name.
    #[serde(default)]
    pub floor_data: BTreeMap<String, FloorEntry>,
}

/// Translation plus a row-major 3x3 rotation block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformEntry {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r00: f64,
    pub r01: f64,
    pub r02: f64,
    pub r10: f64,
    pub r11: f64,
    pub r12: f64,
    pub r20: f64,
    pub r21: f64,
    pub r22: f64,
}

impl TransformEntry {
    pub fn new(translation: &Vector3<f64>, rotation: &Matrix3<f64>) -> Self {
        let r = rotation;
        Self {
            x: translation.x,
            y: translation.y,
            z: translation.z,
            r00: r[(0, 0)],
            r01: r[(0, 1)],
            r02: r[(0, 2)],
            r10: r[(1, 0)],
            r11: r[(1, 1)],
            r12: r[(1, 2)],
            r20: r[(2, 0)],
            r21: r[(2, 1)],
            r22: r[(2, 2)],
        }
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn rotation_block(&self) -> Matrix3<f64> {
        // Matrix3::new takes its arguments in row-major order.
        Matrix3::new(
            self.r00, self.r01, self.r02, self.r10, self.r11, self.r12, self.r20, self.r21,
            self.r22,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorEntry {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<VectorEntry> for Vector3<f64> {
    fn from(v: VectorEntry) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

impl From<Vector3<f64>> for VectorEntry {
    fn from(v: Vector3<f64>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloorEntry {
    pub normal: VectorEntry,
    #[serde(rename = "distanceFromFloor")]
    pub distance_from_floor: f64,
}

impl CalibrationDocument {
    pub fn from_toml_str(text: &str) -> Result<Self, CalibrationError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, CalibrationError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl CalibrationRegistry {
    /// Builds a registry from a persisted document.
    ///
    /// Rotation blocks are orthonormalized before use. Any unknown device name or
    /// malformed block fails the whole load; nothing partial is returned.
    pub fn from_document(document: &CalibrationDocument) -> Result<Self, CalibrationError> {
        let root = match &document.root_device {
            Some(name) => name.parse()?,
            None => DeviceId::default(),
        };
        let mut registry = CalibrationRegistry::new(root);

        for (key, entry) in &document.transforms {
            let pair: DevicePair = key.parse()?;
            let rotation = rotation_from_block(&entry.rotation_block(), key)?;
            let pose = Isometry3::from_parts(Translation3::from(entry.translation()), rotation);
            registry.set_pairwise_isometry(pair.from, pair.to, &pose)?;
        }

        for (name, entry) in &document.floor_data {
            let device: DeviceId = name.parse()?;
            registry.set_floor_reference(device, entry.normal.into(), entry.distance_from_floor)?;
        }

        info!(
            root = %registry.root(),
            transforms = document.transforms.len(),
            floors = document.floor_data.len(),
            "Loaded calibration document"
        );
        Ok(registry)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CalibrationError> {
        Self::from_document(&CalibrationDocument::from_toml_str(text)?)
    }

    /// Exports one entry per calibrated pair (the mirror is implied) plus every floor reference.
    ///
    /// Entries are written from the stored matrix, so any scale is dropped by the
    /// orthonormalization on the next load.
    pub fn to_document(&self) -> CalibrationDocument {
        let transforms = self
            .calibrated_pairs()
            .filter(|(pair, _)| pair.from < pair.to)
            .map(|(pair, calibration)| {
                let m = &calibration.matrix;
                let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
                let block: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
                (pair.to_string(), TransformEntry::new(&translation, &block))
            })
            .collect();

        let floor_data = self
            .floor_references()
            .map(|(device, floor)| {
                (
                    device.to_string(),
                    FloorEntry {
                        normal: floor.floor_normal.into(),
                        distance_from_floor: floor.distance_from_floor,
                    },
                )
            })
            .collect();

        CalibrationDocument {
            root_device: (!self.root().is_none()).then(|| self.root().to_string()),
            transforms,
            floor_data,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, CalibrationError> {
        self.to_document().to_toml_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConvertOptions;
    use approx::assert_abs_diff_eq;

    const SAMPLE: &str = r#"
RootDevice = "depthcamera1"

[Transforms.WandTracker-DepthCamera1]
x = 1.0
y = 0.0
z = 0.0
r00 = 1.0
r01 = 0.0
r02 = 0.0
r10 = 0.0
r11 = 1.0
r12 = 0.0
r20 = 0.0
r21 = 0.0
r22 = 1.0

[FloorData.DepthCamera1]
normal = { x = 0.0, y = 1.0, z = 0.0 }
distanceFromFloor = 1.25
"#;

    #[test]
    fn test_sample_document_loads() {
        let registry = CalibrationRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(registry.root(), DeviceId::DepthCamera1);
        assert!(registry.is_calibrated(DeviceId::DepthCamera1, DeviceId::WandTracker));

        let p = registry.convert_location(
            &Vector3::zeros(),
            DeviceId::WandTracker,
            DeviceId::DepthCamera1,
            &ConvertOptions::floor_referenced(),
        );
        assert_abs_diff_eq!(p, Vector3::new(1.0, 1.25, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_device_fails_the_load() {
        let text = SAMPLE.replace("FloorData.DepthCamera1", "FloorData.Kinect9");
        assert!(matches!(
            CalibrationRegistry::from_toml_str(&text),
            Err(CalibrationError::UnknownDevice(name)) if name == "Kinect9"
        ));
    }

    #[test]
    fn test_skewed_block_fails_the_load() {
        let text = SAMPLE.replace("r01 = 0.0", "r01 = 0.8");
        assert!(matches!(
            CalibrationRegistry::from_toml_str(&text),
            Err(CalibrationError::NonOrthonormalRotation { .. })
        ));
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let text = format!("{}\nbogus = 1\n", SAMPLE.replace("RootDevice", "Root"));
        assert!(matches!(
            CalibrationRegistry::from_toml_str(&text),
            Err(CalibrationError::Parse(_))
        ));
    }

    #[test]
    fn test_export_then_reload_preserves_conversions() {
        let mut registry = CalibrationRegistry::new(DeviceId::HmdTracker);
        let pose = Isometry3::from_parts(
            Translation3::new(0.2, 1.1, -0.4),
            nalgebra::UnitQuaternion::from_euler_angles(0.05, 1.0, -0.1),
        );
        registry
            .set_pairwise_isometry(DeviceId::DepthCamera2, DeviceId::HmdTracker, &pose)
            .unwrap();
        registry
            .set_floor_reference(DeviceId::HmdTracker, Vector3::new(0.0, 0.9, 0.1), 1.6)
            .unwrap();

        let text = registry.to_toml_string().unwrap();
        let reloaded = CalibrationRegistry::from_toml_str(&text).unwrap();

        assert_eq!(reloaded.root(), DeviceId::HmdTracker);
        assert_eq!(reloaded.to_document().transforms.len(), 1);
        let opts = ConvertOptions::floor_referenced();
        let p = Vector3::new(0.3, -0.2, 2.0);
        for (from, to) in [
            (DeviceId::DepthCamera2, DeviceId::HmdTracker),
            (DeviceId::HmdTracker, DeviceId::DepthCamera2),
        ] {
            assert_abs_diff_eq!(
                reloaded.convert_location(&p, from, to, &opts),
                registry.convert_location(&p, from, to, &opts),
                epsilon = 1e-9
            );
        }
    }
}
