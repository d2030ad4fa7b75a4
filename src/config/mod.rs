//! Configuration management for Kiln

pub mod schema;

pub use schema::Config;

use crate::error::{KilnError, KilnResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
    }

    /// Get the default artifact storage root
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Get the audit log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("audit.log")
    }

    /// Resolve the storage root for a configuration
    pub fn storage_root(config: &Config) -> PathBuf {
        config
            .storage
            .root
            .clone()
            .unwrap_or_else(Self::builds_dir)
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> KilnResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> KilnResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if config.storage.suffix_min >= config.storage.suffix_max {
            return Err(KilnError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: format!(
                    "storage.suffix_min ({}) must be below storage.suffix_max ({})",
                    config.storage.suffix_min, config.storage.suffix_max
                ),
            });
        }

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> KilnResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            KilnError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> KilnResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| KilnError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the state directory and storage root exist
    pub async fn ensure_state_dirs(config: &Config) -> KilnResult<()> {
        let dirs = [Self::state_dir(), Self::storage_root(config)];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                KilnError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.features.variant_arch, "arm");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.backend.program = "make".to_string();
        config.storage.root = Some(temp.path().join("builds"));

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.backend.program, "make");
        assert_eq!(
            ConfigManager::storage_root(&loaded),
            temp.path().join("builds")
        );
    }

    #[tokio::test]
    async fn rejects_empty_suffix_range() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[storage]\nsuffix_min = 10\nsuffix_max = 10\n")
            .await
            .unwrap();

        let err = ConfigManager::with_path(path.clone())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::ConfigInvalid { .. }));
    }
}
