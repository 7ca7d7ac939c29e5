// posefuse_sim/src/lib.rs

use tracing::info;
use tracing_subscriber::EnvFilter;

// This prelude is for convenience for other files WITHIN the posefuse_sim crate.
pub mod prelude;

pub mod cli;
pub mod errors;
pub mod simulation;

use crate::cli::Cli;
use crate::errors::SimError;
use crate::simulation::config::load_scenario;
use crate::simulation::runner::{export_calibration, HeadlessRun, RunReport};

/// Filter used when neither `--log-level` nor `RUST_LOG` is given.
pub const DEFAULT_LOG_FILTER: &str = "info,posefuse_core=debug";

/// Installs the global `tracing` subscriber.
pub fn init_tracing(log_level: Option<&str>) {
    let env_filter = match log_level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}

/// Loads the scenario named on the command line, applies the overrides and runs it.
pub fn run_from_cli(cli: &Cli) -> Result<RunReport, SimError> {
    let mut config = load_scenario(&cli.scenario)?;
    if let Some(path) = &cli.calibration {
        config.simulation.calibration_file = Some(path.clone());
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(duration) = cli.duration {
        config.simulation.duration_seconds = duration;
    }

    let mut run = HeadlessRun::new(&config)?;
    let registry = run.registry()?;
    info!(
        root = %registry.root(),
        pairs = registry.calibrated_pairs().count() / 2,
        "Calibration registry ready"
    );
    if let Some(path) = &cli.export_calibration {
        export_calibration(&registry, path)?;
    }
    Ok(run.run(&registry))
}
