//! Kiln - on-demand build coordinator
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cli::{Cli, Commands};
use kiln::config::{Config, ConfigManager};
use kiln::error::KilnResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> KilnResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Load before logging so the configured log format applies
    let config = config_manager.load().await?;
    init_logging(cli.verbose, &config);
    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => kiln::cli::commands::build(args, &config).await,
        Commands::Batch(args) => kiln::cli::commands::batch(args, &config).await,
        Commands::Features => kiln::cli::commands::features(&config).await,
        Commands::Config(args) => {
            kiln::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("kiln=warn"),
        1 => EnvFilter::new("kiln=info"),
        _ => EnvFilter::new("kiln=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .without_time()
            .init();
    }
}
