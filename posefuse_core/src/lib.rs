// posefuse_core/src/lib.rs

// This file defines the public modules of the library.
pub mod calibration;
pub mod errors;
pub mod estimation;
pub mod frames;
pub mod prelude;
pub mod types;
