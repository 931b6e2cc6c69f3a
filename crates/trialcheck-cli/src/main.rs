//! trialcheck CLI.

use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod fixture;
mod logging;

use crate::cli::{Cli, Command};
use crate::commands::{run_definitions, run_validate};
use crate::logging::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_logging(&LogConfig::from_cli(&cli)) {
        eprintln!("error: failed to initialize logging: {error}");
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Command::Validate(args) => run_validate(args)
            .await
            .map(|conformant| conformant || args.no_fail),
        Command::Definitions(args) => run_definitions(args).map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
