//! CLI command definitions and dispatch for the `planwright` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod run;
pub mod tools;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

pub use run::RunArgs;

/// Validate and execute tool plans.
#[derive(Parser)]
#[command(name = "planwright", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through the OpenTelemetry stdout exporter.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a plan file (JSON or YAML).
    #[command(alias = "check")]
    Validate {
        /// Path to the plan file.
        file: PathBuf,
    },

    /// Execute a plan with the built-in tools.
    Run(RunArgs),

    /// List the built-in tools.
    Tools,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "planwright",
            "--json",
            "run",
            "plan.yaml",
            "--mode",
            "dag",
            "--max-concurrency",
            "2",
            "--on-failure",
            "skip",
        ])
        .unwrap();

        assert!(cli.json);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.file, PathBuf::from("plan.yaml"));
        assert_eq!(args.mode, Some(planwright_types::plan::ExecutionMode::Dag));
        assert_eq!(args.max_concurrency, Some(2));
        assert_eq!(args.on_failure, run::FailureMode::Skip);
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["planwright", "-vv", "tools"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
