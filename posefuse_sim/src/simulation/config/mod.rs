// posefuse_sim/src/simulation/config/mod.rs

//! This module handles loading and validating the scenario configuration from
//! disk, with environment overrides layered on top.

pub mod structs;

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::info;

use crate::errors::SimError;
pub use structs::{DeviceConfig, FilterConfig, MotionConfig, Pose, ScenarioConfig, Simulation};

/// Environment variables with this prefix override scenario values, with `__`
/// separating nested keys (e.g. `POSEFUSE_FILTERS__CORRECTION_RATE=0.5`).
pub const ENV_PREFIX: &str = "POSEFUSE_";

/// Loads, merges and validates a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    if !path.exists() {
        return Err(SimError::ScenarioNotFound(path.to_path_buf()));
    }
    info!("Loading scenario from: {}", path.display());

    let config: ScenarioConfig = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Parses a scenario from TOML text without consulting the environment.
pub fn scenario_from_toml_str(text: &str) -> Result<ScenarioConfig, SimError> {
    let config: ScenarioConfig = Figment::new().merge(Toml::string(text)).extract()?;
    config.validate()?;
    Ok(config)
}

fn positive(name: &'static str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter {
            name,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter {
            name,
            reason: format!("must not be negative, got {value}"),
        })
    }
}

impl ScenarioConfig {
    /// Rejects values the runner cannot work with. Serde already covers the types.
    pub fn validate(&self) -> Result<(), SimError> {
        positive("simulation.duration_seconds", self.simulation.duration_seconds)?;
        positive("simulation.frame_rate_hz", self.simulation.frame_rate_hz)?;
        if self.simulation.root_device.is_none() {
            return Err(SimError::InvalidParameter {
                name: "simulation.root_device",
                reason: "the root device cannot be None".to_string(),
            });
        }

        non_negative("filters.position_noise_covariance", self.filters.position_noise_covariance)?;
        non_negative("filters.rotation_noise_covariance", self.filters.rotation_noise_covariance)?;
        non_negative("filters.drift_noise_covariance", self.filters.drift_noise_covariance)?;
        non_negative("filters.correction_rate", self.filters.correction_rate)?;

        for (section, device) in [("drifting", &self.drifting), ("compass", &self.compass)] {
            device.validate(section)?;
        }
        if self.drifting.device == self.compass.device {
            return Err(SimError::InvalidParameter {
                name: "compass.device",
                reason: format!("must differ from the drifting device ({})", self.drifting.device),
            });
        }
        Ok(())
    }
}

impl DeviceConfig {
    pub(crate) fn validate(&self, section: &'static str) -> Result<(), SimError> {
        let invalid = |reason: String| SimError::InvalidParameter {
            name: section,
            reason,
        };
        if self.device.is_none() {
            return Err(invalid("device cannot be None".to_string()));
        }
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return Err(invalid(format!("rate_hz must be positive, got {}", self.rate_hz)));
        }
        for (what, value) in [
            ("sign_flip_probability", self.sign_flip_probability),
            ("dropout_probability", self.dropout_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{what} must lie in [0, 1], got {value}")));
            }
        }
        for (what, value) in [
            ("position_noise_stddev", self.position_noise_stddev),
            ("rotation_noise_stddev_deg", self.rotation_noise_stddev_deg),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(format!("{what} must not be negative, got {value}")));
            }
        }
        Ok(())
    }
}
