// posefuse_sim/src/main.rs

use std::process::ExitCode;

use clap::Parser;
use posefuse_sim::cli::Cli;
use posefuse_sim::{init_tracing, run_from_cli};
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run_from_cli(&cli) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
