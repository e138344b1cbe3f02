mod cli;
mod config;
mod errors;
mod inspect;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;
use tracing::debug;

use crate::cli::Cli;
use crate::config::InspectConfig;

fn main() -> Result<ExitCode> {
    errors::init()?;
    let args = Cli::parse();
    let config = InspectConfig::new()?;
    let _log_guard = logging::init(&config)?;
    debug!(?config, "configuration loaded");

    let ok = inspect::run(args.cmd, &config)?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
