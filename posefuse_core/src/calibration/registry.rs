// posefuse_core/src/calibration/registry.rs

use std::collections::BTreeMap;

use nalgebra::{Isometry3, Matrix4, UnitQuaternion, Vector3, Vector4};
use tracing::debug;

use crate::errors::CalibrationError;
use crate::frames::{world_up, yaw_rotation};
use crate::types::{ConvertOptions, DeviceId, DevicePair, FrameConverter};

/// A rigid (optionally scaled) transform from one device frame into another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCalibration {
    /// Translation as recorded at calibration time. For a derived mirror entry this is
    /// the negated forward translation; conversions always go through `matrix`.
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    /// Homogeneous transform applied to points. Authoritative for conversions.
    pub matrix: Matrix4<f64>,
}

impl PairCalibration {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            matrix: Matrix4::identity(),
        }
    }

    /// Non-uniform scale approximated by the column magnitudes of the linear block.
    pub fn local_scale(&self) -> Vector3<f64> {
        let linear = self.matrix.fixed_view::<3, 3>(0, 0);
        Vector3::new(
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        )
    }

    fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let h = self.matrix * Vector4::new(point.x, point.y, point.z, 1.0);
        let w = if h.w.abs() > f64::EPSILON { h.w } else { 1.0 };
        Vector3::new(h.x, h.y, h.z) / w
    }

    fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0) * vector
    }
}

impl Default for PairCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

/// Per-device floor data: the rotation that levels the device's view of the floor and
/// the device's height above it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorReference {
    /// Floor normal as measured in the device frame.
    pub floor_normal: Vector3<f64>,
    /// `inverse(rotation_from_to(floor_normal, up))`.
    pub pitch_correction: UnitQuaternion<f64>,
    pub distance_from_floor: f64,
}

impl FloorReference {
    /// Rotation that maps the device's measured floor normal onto world up.
    pub fn leveling(&self) -> UnitQuaternion<f64> {
        self.pitch_correction.inverse()
    }
}

impl Default for FloorReference {
    fn default() -> Self {
        Self {
            floor_normal: world_up(),
            pitch_correction: UnitQuaternion::identity(),
            distance_from_floor: 0.0,
        }
    }
}

/// The shortest rotation taking direction `from` onto direction `to`.
///
/// Opposite directions are resolved with a half turn about X, or about Z when
/// `from` is itself along X.
pub fn rotation_from_to(from: &Vector3<f64>, to: &Vector3<f64>) -> Option<UnitQuaternion<f64>> {
    let from = from.try_normalize(1e-9)?;
    let to = to.try_normalize(1e-9)?;
    UnitQuaternion::rotation_between(&from, &to).or_else(|| {
        let axis = if from.x.abs() < 0.9 {
            Vector3::x_axis()
        } else {
            Vector3::z_axis()
        };
        Some(UnitQuaternion::from_axis_angle(&axis, std::f64::consts::PI))
    })
}

/// The table of pairwise device calibrations, floor references and the root device.
///
/// Every stored pair `(A, B)` has a mirror `(B, A)` holding the inverse transform; both
/// are written together. Looking up an uncalibrated pair yields the identity.
///
/// Writes are expected only during an explicit calibration phase. Share it behind a
/// single lock if frames keep running while calibrating.
#[derive(Debug, Clone, Default)]
pub struct CalibrationRegistry {
    root: DeviceId,
    pairs: BTreeMap<DevicePair, PairCalibration>,
    floors: BTreeMap<DeviceId, FloorReference>,
}

impl CalibrationRegistry {
    pub fn new(root: DeviceId) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn root(&self) -> DeviceId {
        self.root
    }

    pub fn set_root(&mut self, root: DeviceId) {
        self.root = root;
    }

    // --- Writes ---

    /// Stores the transform taking `from` coordinates into `to` coordinates, and its mirror.
    pub fn set_pairwise_transform(
        &mut self,
        from: DeviceId,
        to: DeviceId,
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        matrix: Matrix4<f64>,
    ) -> Result<(), CalibrationError> {
        if from == to {
            return Err(CalibrationError::SelfPairing(from));
        }
        let inverse_matrix = matrix
            .try_inverse()
            .ok_or(CalibrationError::SingularTransform { from, to })?;

        let pair = DevicePair::new(from, to);
        self.pairs.insert(
            pair,
            PairCalibration {
                translation,
                rotation,
                matrix,
            },
        );
        self.pairs.insert(
            pair.mirrored(),
            PairCalibration {
                translation: -translation,
                rotation: rotation.inverse(),
                matrix: inverse_matrix,
            },
        );
        debug!(%pair, "Stored pairwise calibration and its inverse");
        Ok(())
    }

    /// Convenience for rigid transforms: the matrix is derived from `pose`.
    pub fn set_pairwise_isometry(
        &mut self,
        from: DeviceId,
        to: DeviceId,
        pose: &Isometry3<f64>,
    ) -> Result<(), CalibrationError> {
        self.set_pairwise_transform(
            from,
            to,
            pose.translation.vector,
            pose.rotation,
            pose.to_homogeneous(),
        )
    }

    /// Removes both directions of a pair. Returns whether anything was stored.
    pub fn remove_pair(&mut self, a: DeviceId, b: DeviceId) -> bool {
        let pair = DevicePair::new(a, b);
        let forward = self.pairs.remove(&pair).is_some();
        let mirror = self.pairs.remove(&pair.mirrored()).is_some();
        forward || mirror
    }

    /// Stores `device`'s floor as seen by the device: its normal and its distance from the device.
    pub fn set_floor_reference(
        &mut self,
        device: DeviceId,
        floor_normal: Vector3<f64>,
        distance_from_floor: f64,
    ) -> Result<(), CalibrationError> {
        let to_up = rotation_from_to(&floor_normal, &world_up())
            .ok_or(CalibrationError::DegenerateFloorNormal(device))?;

        self.floors.insert(
            device,
            FloorReference {
                floor_normal,
                pitch_correction: to_up.inverse(),
                distance_from_floor,
            },
        );
        debug!(%device, distance_from_floor, "Stored floor reference");
        Ok(())
    }

    /// Drops every pair and floor reference. The root device is kept.
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.floors.clear();
    }

    // --- Lookups ---

    /// The transform from `from` into `to`. Identity if uncalibrated or if `from == to`.
    pub fn pair(&self, from: DeviceId, to: DeviceId) -> PairCalibration {
        if from == to {
            return PairCalibration::identity();
        }
        self.pairs
            .get(&DevicePair::new(from, to))
            .copied()
            .unwrap_or_default()
    }

    pub fn is_calibrated(&self, from: DeviceId, to: DeviceId) -> bool {
        from == to || self.pairs.contains_key(&DevicePair::new(from, to))
    }

    /// Every stored pair, mirrors included, in key order.
    pub fn calibrated_pairs(&self) -> impl Iterator<Item = (&DevicePair, &PairCalibration)> {
        self.pairs.iter()
    }

    /// The floor reference of `device`, or the level/zero-height default.
    pub fn floor_reference(&self, device: DeviceId) -> FloorReference {
        self.floors.get(&device).copied().unwrap_or_default()
    }

    pub fn floor_references(&self) -> impl Iterator<Item = (&DeviceId, &FloorReference)> {
        self.floors.iter()
    }

    pub fn has_floor_reference(&self, device: DeviceId) -> bool {
        self.floors.contains_key(&device)
    }

    /// Approximate non-uniform scale of the `device -> root` transform.
    pub fn extract_local_scale(&self, device: DeviceId, root: DeviceId) -> Vector3<f64> {
        self.pair(device, root).local_scale()
    }

    // --- Conversions ---

    /// Rotation applied after the frame change: floor leveling of `target`, then the yaw offset.
    fn post_rotation(&self, target: DeviceId, options: &ConvertOptions) -> UnitQuaternion<f64> {
        let leveling = if options.apply_floor_pitch {
            self.floor_reference(target).leveling()
        } else {
            UnitQuaternion::identity()
        };
        yaw_rotation(options.yaw_offset_degrees) * leveling
    }

    pub fn convert_location(
        &self,
        point: &Vector3<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64> {
        let mut p = if device != target {
            self.pair(device, target).transform_point(point)
        } else {
            *point
        };

        p = self.post_rotation(target, options) * p;

        if options.apply_floor_height {
            p.y += self.floor_reference(target).distance_from_floor;
        }
        p + options.position_offset
    }

    pub fn convert_rotation(
        &self,
        rotation: &UnitQuaternion<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> UnitQuaternion<f64> {
        let r = if device != target {
            self.pair(device, target).rotation * rotation
        } else {
            *rotation
        };
        self.post_rotation(target, options) * r
    }

    pub fn convert_velocity(
        &self,
        velocity: &Vector3<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64> {
        let v = if device != target {
            self.pair(device, target).transform_vector(velocity)
        } else {
            *velocity
        };
        self.post_rotation(target, options) * v
    }

    /// Shorthand for [`Self::convert_location`] into the root frame.
    pub fn location_in_root(
        &self,
        point: &Vector3<f64>,
        device: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64> {
        self.convert_location(point, device, self.root, options)
    }

    /// Shorthand for [`Self::convert_rotation`] into the root frame.
    pub fn rotation_in_root(
        &self,
        rotation: &UnitQuaternion<f64>,
        device: DeviceId,
        options: &ConvertOptions,
    ) -> UnitQuaternion<f64> {
        self.convert_rotation(rotation, device, self.root, options)
    }
}

impl FrameConverter for CalibrationRegistry {
    fn root(&self) -> DeviceId {
        self.root
    }

    fn convert_location(
        &self,
        point: &Vector3<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64> {
        CalibrationRegistry::convert_location(self, point, device, target, options)
    }

    fn convert_rotation(
        &self,
        rotation: &UnitQuaternion<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> UnitQuaternion<f64> {
        CalibrationRegistry::convert_rotation(self, rotation, device, target, options)
    }

    fn convert_velocity(
        &self,
        velocity: &Vector3<f64>,
        device: DeviceId,
        target: DeviceId,
        options: &ConvertOptions,
    ) -> Vector3<f64> {
        CalibrationRegistry::convert_velocity(self, velocity, device, target, options)
    }
}
