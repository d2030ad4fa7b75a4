//! Error types for Kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in Kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Request errors
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    // Build errors
    #[error("Build {identity} failed: {reason}")]
    BuildFailed { identity: String, reason: String },

    #[error("No compiler backend configured")]
    BackendNotConfigured,

    #[error("Build {0} was abandoned without publishing a result")]
    ConcurrencyHazard(String),

    #[error("{failed} of {total} batch requests failed")]
    BatchFailed { failed: usize, total: usize },

    // Storage errors
    #[error("Storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("Failed to package {path}: {reason}")]
    Package { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Create a storage error for a path
    pub fn storage(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the caller is at fault (bad request) rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidParameter { .. })
    }

    /// HTTP status code an outer transport layer should report
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BackendNotConfigured => {
                Some("Set [backend] program in the config file, e.g.: kiln config init")
            }
            Self::InvalidParameter { name, .. } if *name == "features" => {
                Some("Run: kiln features")
            }
            Self::BuildFailed { .. } => Some("Re-run the same request to retry the build"),
            _ => None,
        }
    }
}
