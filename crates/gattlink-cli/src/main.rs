//! gattlink CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gattlink_cli::{cli::Cli, commands::CommandDispatcher, config::CliAppConfig, error::Result};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(&cli)?;

    setup_logging(cli.verbose || config.cli.verbose);

    if let Err(e) = CommandDispatcher::execute(cli.command, &config) {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("gattlink exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level, overridable through `RUST_LOG`
fn setup_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, directives.as_deref()))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<CliAppConfig> {
    match &cli.config {
        Some(config_path) => Ok(CliAppConfig::load_from_file(config_path)?),
        None => Ok(CliAppConfig::default()),
    }
}

/// Filter from explicit directives, falling back to the verbosity level when
/// none are given or they fail to parse
fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}
