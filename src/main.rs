use anyhow::Result;
use clap::Parser;
use shellenv::cli::Cli;
use shellenv::commands;

fn main() -> Result<()> {
    // Parse CLI arguments first so --verbose can raise the log level
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "shellenv=debug"
    } else {
        "shellenv=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // Logs go to stderr so `shellenv env` output can be eval'd
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    commands::execute(cli)
}
