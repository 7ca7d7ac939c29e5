// posefuse_sim/src/cli.rs

use std::path::PathBuf;

use clap::Parser;

/// Headless pose-fusion driver.
///
/// Emulates a drifting orientation source and a compass source, runs them through
/// the calibration registry and the fused tracker, and reports the error against
/// ground truth.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/default.toml")]
    pub scenario: PathBuf,

    /// Calibration TOML to load instead of the one named by the scenario.
    #[arg(short, long)]
    pub calibration: Option<PathBuf>,

    /// Overrides the scenario's PRNG seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Overrides the scenario's duration, in seconds.
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Log filter directive (e.g. "debug" or "info,posefuse_core=trace"). Takes
    /// precedence over RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write the registry used for the run to this path as TOML.
    #[arg(long)]
    pub export_calibration: Option<PathBuf>,
}
