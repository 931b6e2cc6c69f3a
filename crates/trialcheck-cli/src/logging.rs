//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! Logs go to stderr so report output on stdout stays machine-readable.
//! `RUST_LOG` overrides the level chosen from the flags.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, LogFormatArg};

/// Configuration for logging behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub format: LogFormatArg,
}

impl LogConfig {
    /// Build logging configuration from the CLI flags.
    pub fn from_cli(cli: &Cli) -> Self {
        let level = if cli.quiet {
            LevelFilter::ERROR
        } else {
            match cli.verbose {
                0 => LevelFilter::WARN,
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        };

        Self {
            level,
            format: cli.log_format,
        }
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match config.format {
        LogFormatArg::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormatArg::Compact => registry.with(layer.compact()).try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_level_from_flags() {
        let cli = Cli::try_parse_from(["trialcheck", "-vv", "definitions", "c.yaml"]).unwrap();
        assert_eq!(LogConfig::from_cli(&cli).level, LevelFilter::TRACE);

        let cli = Cli::try_parse_from(["trialcheck", "-q", "definitions", "c.yaml"]).unwrap();
        assert_eq!(LogConfig::from_cli(&cli).level, LevelFilter::ERROR);

        let cli = Cli::try_parse_from(["trialcheck", "definitions", "c.yaml"]).unwrap();
        let config = LogConfig::from_cli(&cli);
        assert_eq!(config.level, LevelFilter::WARN);
        assert_eq!(config.format, LogFormatArg::Pretty);
    }
}
