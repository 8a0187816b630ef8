//! Planwright command-line entry point.
//!
//! Binary name: `planwright`
//!
//! Parses CLI arguments, installs tracing, then dispatches to the command
//! handlers. Plans run against the built-in demo tool registry.

mod cli;
mod config;

use clap::Parser;
use clap_complete::generate;
use planwright_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,planwright=debug",
        _ => "trace",
    };

    // JSON output runs log JSON lines too
    let format = if cli.json { LogFormat::Json } else { LogFormat::Text };
    init_tracing(&TracingOptions::new(filter).with_format(format).with_otel(cli.otel))
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    // Shell completions don't need anything else
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "planwright", &mut std::io::stdout());
        return Ok(());
    }

    let result = match cli.command {
        Commands::Validate { file } => cli::validate::validate_plan(&file, cli.json),
        Commands::Run(args) => cli::run::run_plan(args, cli.json, cli.quiet).await,
        Commands::Tools => cli::tools::list_tools(cli.json),
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
