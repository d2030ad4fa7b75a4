//! CLI command implementations

pub mod batch;
pub mod build;
pub mod config;
pub mod features;

pub use batch::execute as batch;
pub use build::execute as build;
pub use config::execute as config;
pub use features::execute as features;

use crate::backend::create_backend;
use crate::build::BuildCoordinator;
use crate::cli::args::OutputFormat;
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::response::BuildResponse;
use console::style;

/// Construct the coordinator shared by every request of this process
async fn coordinator(config: &Config) -> KilnResult<BuildCoordinator> {
    let backend = create_backend(config)?;
    ConfigManager::ensure_state_dirs(config).await?;
    Ok(BuildCoordinator::from_config(config, backend))
}

fn print_response(response: &BuildResponse, format: OutputFormat) -> KilnResult<()> {
    match format {
        OutputFormat::Table => {
            let status = if response.status == 201 {
                style(format!("{} {}", response.status, response.outcome)).green()
            } else {
                style(format!("{} {}", response.status, response.outcome)).cyan()
            };
            println!("{:<22} {}", style("Status").bold(), status);
            println!("{:<22} {}", style("Identity").bold(), response.identity);
            for (name, value) in response.headers() {
                println!("{:<22} {}", style(name).bold(), value);
            }
            println!(
                "{:<22} {}",
                style("Archive").bold(),
                response.archive_path.display()
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(response)?),
        OutputFormat::Plain => println!("{}", response.location),
    }
    Ok(())
}
