// posefuse_core/src/estimation/filters/mod.rs

pub mod kalman;
pub mod position;
pub mod rotation;
