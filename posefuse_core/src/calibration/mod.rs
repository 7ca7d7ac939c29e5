// posefuse_core/src/calibration/mod.rs

//! Multi-device coordinate calibration: pairwise transforms between device frames,
//! per-device floor references, and their persisted form.

pub mod document;
pub mod orthonormal;
pub mod registry;

pub use document::{CalibrationDocument, FloorEntry, TransformEntry, VectorEntry};
pub use registry::{rotation_from_to, CalibrationRegistry, FloorReference, PairCalibration};
