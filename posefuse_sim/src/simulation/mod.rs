// posefuse_sim/src/simulation/mod.rs

pub mod config;
pub mod core;
pub mod devices;
pub mod runner;
pub mod tracker;
