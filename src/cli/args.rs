//! CLI argument definitions using clap derive

use crate::build::params::BuildRequest;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln - on-demand build coordinator
///
/// Compiles each distinct build configuration exactly once and serves the
/// packaged artifact to every identical request.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or reuse) one artifact
    Build(BuildArgs),

    /// Issue every request in a batch file concurrently
    Batch(BatchArgs),

    /// List known features in canonical order
    Features,

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Target operating system
    #[arg(long)]
    pub os: String,

    /// Target architecture
    #[arg(long)]
    pub arch: String,

    /// Architecture sub-variant (only used for the variant architecture)
    #[arg(long, default_value = "")]
    pub arm: String,

    /// Features to include (comma-separated)
    #[arg(long, default_value = "")]
    pub features: String,

    /// Copy the packaged artifact to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

impl BuildArgs {
    /// Raw request described by these arguments
    pub fn request(&self) -> BuildRequest {
        BuildRequest::new(&self.os, &self.arch, &self.arm, &self.features)
    }
}

/// Arguments for the batch command
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// TOML file with `[[request]]` entries
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for build results
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (location only)
    Plain,
}
