// posefuse_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::estimation::SignalFilter;
pub use crate::types::{ConvertOptions, DeviceId, DevicePair, FrameConverter};

// --- Errors ---
pub use crate::errors::CalibrationError;

// --- Filters ---
pub use crate::estimation::drift::{CompassReading, DriftCorrector};
pub use crate::estimation::filters::kalman::{KalmanCore, UpdateOutcome};
pub use crate::estimation::filters::position::PositionFilter;
pub use crate::estimation::filters::rotation::{resolve_sign_ambiguity, RotationFilter};

// --- Calibration ---
pub use crate::calibration::{CalibrationDocument, CalibrationRegistry, FloorReference, PairCalibration};
