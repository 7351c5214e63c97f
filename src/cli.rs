// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `workerwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "workerwatch",
    version,
    about = "Run an analysis worker, follow its progress and collect its result.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `WORKERWATCH_CONFIG`, else `Workerwatch.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Input file handed to the worker. Prompted for when omitted and stdin
    /// is a terminal.
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Override `[worker].output_dir`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WORKERWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config and print the worker invocation without running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Print job events as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,

    /// Open the folder containing the result file after a successful run.
    #[arg(long)]
    pub open_output: bool,

    /// Delete the result file after a successful run and its summary are printed.
    #[arg(long)]
    pub delete_result: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
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
