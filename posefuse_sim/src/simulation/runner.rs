// posefuse_sim/src/simulation/runner.rs

//! The fixed-step headless loop: ground truth, device emulation, tracking and
//! scoring, one frame at a time.

use std::fmt;
use std::path::Path;

use posefuse_core::frames::heading_degrees;
use posefuse_core::prelude::*;
use tracing::{debug, info, warn};

use crate::errors::SimError;
use crate::simulation::config::ScenarioConfig;
use crate::simulation::core::{ground_truth_at, SimulationRng};
use crate::simulation::devices::EmulatedDevice;
use crate::simulation::tracker::FusedTracker;

/// Error statistics of a finished run, measured against ground truth in the root frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunReport {
    pub frames: usize,
    pub simulated_seconds: f64,
    pub fresh_drifting_samples: usize,
    pub fresh_compass_samples: usize,
    /// Frames on which the compass device had lost the object.
    pub compass_dropouts: usize,
    pub mean_heading_error_deg: f64,
    pub max_heading_error_deg: f64,
    pub final_heading_error_deg: f64,
    /// Heading error of the drifting source alone at the end of the run.
    pub final_uncorrected_heading_error_deg: f64,
    pub mean_position_error: f64,
    pub max_position_error: f64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "frames:                   {}", self.frames)?;
        writeln!(f, "simulated seconds:        {:.2}", self.simulated_seconds)?;
        writeln!(
            f,
            "fresh samples:            drifting {}, compass {} ({} frames lost)",
            self.fresh_drifting_samples, self.fresh_compass_samples, self.compass_dropouts
        )?;
        writeln!(
            f,
            "heading error [deg]:      mean {:.3}, max {:.3}, final {:.3}",
            self.mean_heading_error_deg, self.max_heading_error_deg, self.final_heading_error_deg
        )?;
        writeln!(
            f,
            "uncorrected final [deg]:  {:.3}",
            self.final_uncorrected_heading_error_deg
        )?;
        write!(
            f,
            "position error [m]:       mean {:.4}, max {:.4}",
            self.mean_position_error, self.max_position_error
        )
    }
}

/// Smallest absolute difference between two headings, in `[0, 180]`.
pub fn heading_error_degrees(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Builds the registry a run converts through.
///
/// With a calibration file the persisted transforms are used as-is (so calibration
/// errors show up in the report); otherwise every emulated device is registered with
/// its true mounting pose.
pub fn build_registry(
    config: &ScenarioConfig,
    devices: &[&EmulatedDevice],
) -> Result<CalibrationRegistry, SimError> {
    let root = config.simulation.root_device;

    let Some(path) = &config.simulation.calibration_file else {
        let mut registry = CalibrationRegistry::new(root);
        for device in devices.iter().filter(|d| d.device() != root) {
            registry.set_pairwise_isometry(device.device(), root, &device.mounting())?;
        }
        return Ok(registry);
    };

    let mut registry = load_calibration(path)?;
    if registry.root() != root {
        warn!(
            file_root = %registry.root(),
            scenario_root = %root,
            "Calibration file names a different root device, using the scenario's"
        );
        registry.set_root(root);
    }
    for device in devices {
        if device.device() != root && !registry.is_calibrated(device.device(), root) {
            warn!(device = %device.device(), root = %root, "Device is not calibrated against the root, its readings pass through unchanged");
        }
    }
    Ok(registry)
}

pub fn load_calibration(path: &Path) -> Result<CalibrationRegistry, SimError> {
    let text = std::fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(CalibrationRegistry::from_toml_str(&text)?)
}

pub fn export_calibration(registry: &CalibrationRegistry, path: &Path) -> Result<(), SimError> {
    let text = registry.to_toml_string()?;
    std::fs::write(path, text).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote calibration to: {}", path.display());
    Ok(())
}

/// Headless replacement for the per-frame scheduler of a tracking host.
pub struct HeadlessRun {
    config: ScenarioConfig,
    rng: SimulationRng,
    drifting: EmulatedDevice,
    compass: EmulatedDevice,
    tracker: FusedTracker,
}

impl HeadlessRun {
    pub fn new(config: &ScenarioConfig) -> Result<Self, SimError> {
        config.validate()?;
        let drifting = EmulatedDevice::new(&config.drifting, "drifting")?;
        let compass = EmulatedDevice::new(&config.compass, "compass")?;
        let tracker = FusedTracker::new(drifting.device(), compass.device(), &config.filters);
        Ok(Self {
            config: config.clone(),
            rng: SimulationRng::new(config.simulation.seed),
            drifting,
            compass,
            tracker,
        })
    }

    /// The registry for this run, built from the scenario (see [`build_registry`]).
    pub fn registry(&self) -> Result<CalibrationRegistry, SimError> {
        build_registry(&self.config, &[&self.drifting, &self.compass])
    }

    /// Steps the whole scenario and scores it.
    pub fn run(&mut self, frames: &dyn FrameConverter) -> RunReport {
        let rate = self.config.simulation.frame_rate_hz;
        let dt = 1.0 / rate;
        let frame_count = (self.config.simulation.duration_seconds * rate).ceil() as usize;
        let log_every = (rate.round() as usize).max(1);

        info!(
            frames = frame_count,
            drifting = %self.drifting.device(),
            compass = %self.compass.device(),
            root = %frames.root(),
            "Starting headless run"
        );

        let mut report = RunReport::default();
        let mut heading_error_sum = 0.0;
        let mut position_error_sum = 0.0;
        let mut scored = 0usize;

        for frame in 0..frame_count {
            let time = frame as f64 * dt;
            let step = if frame == 0 { 0.0 } else { dt };
            let truth = ground_truth_at(&self.config.motion, time);

            let drifting = self.drifting.sample(&truth, step, &mut self.rng);
            let compass = self.compass.sample(&truth, step, &mut self.rng);
            if drifting.is_some_and(|s| s.fresh) {
                report.fresh_drifting_samples += 1;
            }
            match compass {
                Some(s) if s.fresh => report.fresh_compass_samples += 1,
                None => report.compass_dropouts += 1,
                _ => {}
            }

            // Without a drifting reading there is no orientation to report this frame.
            let Some(drifting) = drifting else {
                continue;
            };
            let pose = self.tracker.update(
                frames,
                &drifting,
                compass.as_ref(),
                self.compass.confidence_limited(),
                step,
            );

            let true_heading = heading_degrees(&truth.pose.rotation);
            let heading_error = heading_error_degrees(heading_degrees(&pose.rotation), true_heading);
            let position_error = (pose.position - truth.pose.translation.vector).norm();

            scored += 1;
            heading_error_sum += heading_error;
            position_error_sum += position_error;
            report.max_heading_error_deg = report.max_heading_error_deg.max(heading_error);
            report.max_position_error = report.max_position_error.max(position_error);
            report.final_heading_error_deg = heading_error;
            report.final_uncorrected_heading_error_deg =
                heading_error_degrees(heading_degrees(&pose.uncorrected_rotation), true_heading);

            if frame % log_every == 0 {
                debug!(
                    time = %format_args!("{time:.2}"),
                    heading_error = %format_args!("{heading_error:.3}"),
                    position_error = %format_args!("{position_error:.4}"),
                    device_drift = %format_args!("{:.3}", self.drifting.drift_degrees()),
                    "Tracker state"
                );
            }
        }

        report.frames = frame_count;
        report.simulated_seconds = frame_count as f64 * dt;
        if scored > 0 {
            report.mean_heading_error_deg = heading_error_sum / scored as f64;
            report.mean_position_error = position_error_sum / scored as f64;
        }
        info!(
            mean_heading_error = report.mean_heading_error_deg,
            max_heading_error = report.max_heading_error_deg,
            mean_position_error = report.mean_position_error,
            "Headless run finished"
        );
        report
    }
}

/// Builds the registry from the scenario and runs it.
pub fn run_scenario(config: &ScenarioConfig) -> Result<RunReport, SimError> {
    let mut run = HeadlessRun::new(config)?;
    let registry = run.registry()?;
    Ok(run.run(&registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::Pose;
    use posefuse_core::types::DeviceId;

    #[test]
    fn test_heading_error_wraps() {
        assert_eq!(heading_error_degrees(359.0, 1.0), 2.0);
        assert_eq!(heading_error_degrees(10.0, 190.0), 180.0);
        assert_eq!(heading_error_degrees(45.0, 45.0), 0.0);
    }

    #[test]
    fn test_registry_from_mountings_skips_the_root() {
        let mut config = ScenarioConfig::default();
        config.drifting.mounting = Pose {
            translation: [0.0, 1.0, 0.0],
            rotation_deg: [0.0, 45.0, 0.0],
        };
        let run = HeadlessRun::new(&config).unwrap();
        let registry = run.registry().unwrap();

        assert_eq!(registry.root(), DeviceId::DepthCamera1);
        assert!(registry.is_calibrated(DeviceId::HmdTracker, DeviceId::DepthCamera1));
        assert_eq!(registry.calibrated_pairs().count(), 2);
    }

    #[test]
    fn test_missing_calibration_file_is_an_io_error() {
        let mut config = ScenarioConfig::default();
        config.simulation.calibration_file = Some("does/not/exist.toml".into());
        let run = HeadlessRun::new(&config).unwrap();
        assert!(matches!(run.registry(), Err(SimError::Io { .. })));
    }

    #[test]
    fn test_report_counts_every_frame() {
        let mut config = ScenarioConfig::default();
        config.simulation.seed = Some(11);
        config.simulation.duration_seconds = 2.0;
        config.simulation.frame_rate_hz = 50.0;
        let report = run_scenario(&config).unwrap();

        assert_eq!(report.frames, 100);
        // 90 Hz device against a 50 Hz loop ticks every frame; the 30 Hz compass does not.
        assert_eq!(report.fresh_drifting_samples, 100);
        assert!(report.fresh_compass_samples + report.compass_dropouts < 100);
        assert!(report.mean_heading_error_deg <= report.max_heading_error_deg);
    }
}
