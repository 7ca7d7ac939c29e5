// posefuse_sim/src/errors.rs

use std::path::PathBuf;

use posefuse_core::errors::CalibrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Scenario file not found: {0}")]
    ScenarioNotFound(PathBuf),

    #[error("Failed to load scenario configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("Invalid scenario parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl From<figment::Error> for SimError {
    fn from(e: figment::Error) -> Self {
        SimError::Config(Box::new(e))
    }
}
