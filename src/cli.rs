// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::workflow::RunOptions;

/// Command-line arguments for `cyclerun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cyclerun",
    version,
    about = "Run forecast cycles: submit each step, wait for it, retry failures.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `cyclerun.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "cyclerun.toml")]
    pub config: String,

    /// Only run cases with this name (`case-3_d01`), number (`3`) or domain (`d01`).
    #[arg(long, value_name = "CASE")]
    pub case: Option<String>,

    /// Resume from this step, skipping the ones before it.
    #[arg(long, value_name = "STEP")]
    pub from: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CYCLERUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the steps of each case, submit nothing.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            case_filter: self.case.clone(),
            from: self.from.clone(),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["cyclerun"]);
        assert_eq!(args.config, "cyclerun.toml");
        assert!(!args.dry_run);
        assert!(args.run_options().from.is_none());
    }

    #[test]
    fn resume_options() {
        let args = CliArgs::parse_from([
            "cyclerun", "--config", "run.toml", "--case", "d02", "--from", "wrf", "--log-level", "debug",
        ]);
        let opts = args.run_options();
        assert_eq!(opts.case_filter.as_deref(), Some("d02"));
        assert_eq!(opts.from.as_deref(), Some("wrf"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
