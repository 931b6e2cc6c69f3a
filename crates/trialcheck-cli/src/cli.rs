//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "trialcheck",
    version,
    about = "Validate imaging measurements against trial response criteria",
    long_about = "Validate lesion measurements recorded across baseline and follow-up \n\
                  timepoints against a trial criteria type (e.g. RECIST, irRC).\n\n\
                  Criteria are declared in a YAML or JSON definitions file; the \n\
                  measurements, timepoints and study metadata come from a JSON fixture."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v for debug, -vv for trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a measurement fixture against a criteria type.
    Validate(ValidateArgs),

    /// Check a definitions file and list the criteria types it declares.
    Definitions(DefinitionsArgs),
}

#[derive(Parser)]
pub struct ValidateArgs {
    /// Criteria definitions file (.yaml, .yml or .json).
    #[arg(long, short = 'd', value_name = "FILE")]
    pub definitions: PathBuf,

    /// Measurement fixture (JSON).
    #[arg(long, short = 'f', value_name = "FILE")]
    pub fixture: PathBuf,

    /// Criteria type identifier (case-insensitive).
    #[arg(long, short = 'c', value_name = "ID")]
    pub criteria: String,

    /// Runtime configuration (YAML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormatArg,

    /// Exit with status 0 even when nonconformities are found.
    #[arg(long = "no-fail")]
    pub no_fail: bool,
}

#[derive(Parser)]
pub struct DefinitionsArgs {
    /// Criteria definitions file (.yaml, .yml or .json).
    #[arg(value_name = "FILE")]
    pub definitions: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    /// Human-readable summary
    Text,
    /// Full report as JSON
    Json,
    /// Grouped nonconformities only, as JSON
    Grouped,
}

/// CLI log format choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
}
