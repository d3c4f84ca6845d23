// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `fleetvisor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fleetvisor",
    version,
    about = "Materialize pushed configuration and supervise the processes that use it.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the agent config file (TOML).
    ///
    /// Default: `Fleetvisor.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Fleetvisor.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLEETVISOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the modules and resolved identity, but don't
    /// start anything.
    #[arg(long)]
    pub dry_run: bool,
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
