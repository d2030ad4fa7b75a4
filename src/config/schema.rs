//! Configuration schema for Kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact storage settings
    pub storage: StorageConfig,

    /// Response settings
    pub server: ServerConfig,

    /// Feature registry
    pub features: FeaturesConfig,

    /// Compiler backend settings
    pub backend: BackendConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one directory per build attempt.
    /// Defaults to `<state_dir>/kiln/builds`.
    pub root: Option<PathBuf>,

    /// Prefix of the produced binary name (`{prefix}_{os}_{arch}_custom`)
    pub binary_prefix: String,

    /// Lower bound (inclusive) of the random attempt directory suffix
    pub suffix_min: u32,

    /// Upper bound (exclusive) of the random attempt directory suffix
    pub suffix_max: u32,

    /// How long a completed artifact is advertised as fresh
    pub artifact_ttl_hours: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            binary_prefix: "build".to_string(),
            suffix_min: 100,
            suffix_max: 1000,
            artifact_ttl_hours: 24,
        }
    }
}

/// Response configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL used for artifact location references
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2015".to_string(),
        }
    }
}

/// Feature registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Known feature directives, in canonical order
    pub registry: Vec<String>,

    /// Architecture for which the sub-variant is meaningful
    pub variant_arch: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            registry: [
                "cors", "git", "gzip", "hugo", "ipfilter", "jsonp", "markdown", "prometheus",
                "realip", "search",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            variant_arch: "arm".to_string(),
        }
    }
}

/// Compiler backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Program to run for each build (empty = not configured)
    pub program: String,

    /// Arguments; `{os}`, `{arch}`, `{variant}`, `{features}`, `{output}`
    /// and `{dir}` are substituted
    pub args: Vec<String>,

    /// Working directory for the build command
    pub workdir: Option<PathBuf>,

    /// Package the produced binary into the zip archive after the command
    pub package: bool,

    /// Additional environment variables for the build command
    pub env: HashMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: vec![],
            workdir: None,
            package: true,
            env: HashMap::new(),
        }
    }
}
