//! Artifact storage allocation
//!
//! Every build attempt gets its own directory under the storage root, named
//! `{yymmddHHMMSS}{suffix}`. The directory is claimed with an atomic create,
//! so two attempts can never share a location even within the same second.

use crate::build::params::BuildParameters;
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use chrono::Utc;
use rand::Rng;
use std::io::ErrorKind;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Locations assigned to one build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Attempt directory
    pub dir: PathBuf,
    /// Raw compiled binary
    pub binary_path: PathBuf,
    /// Packaged archive served to clients
    pub archive_path: PathBuf,
    /// File name of the packaged archive
    pub archive_filename: String,
}

/// Hands out collision-free attempt directories
#[derive(Debug, Clone)]
pub struct ArtifactPathAllocator {
    root: PathBuf,
    binary_prefix: String,
    suffixes: Range<u32>,
}

impl ArtifactPathAllocator {
    /// Create an allocator. An empty suffix range is widened to one value.
    pub fn new(
        root: impl Into<PathBuf>,
        binary_prefix: impl Into<String>,
        suffixes: Range<u32>,
    ) -> Self {
        let suffixes = if suffixes.is_empty() {
            suffixes.start..suffixes.start.saturating_add(1)
        } else {
            suffixes
        };

        Self {
            root: root.into(),
            binary_prefix: binary_prefix.into(),
            suffixes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ConfigManager::storage_root(config),
            config.storage.binary_prefix.clone(),
            config.storage.suffix_min..config.storage.suffix_max,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base name shared by the binary and the archive
    fn base_name(&self, params: &BuildParameters) -> String {
        format!("{}_{}_{}_custom", self.binary_prefix, params.os, params.arch)
    }

    /// Raw binary file name; Windows targets get `.exe`
    pub fn binary_filename(&self, params: &BuildParameters) -> String {
        let base = self.base_name(params);
        if params.is_windows() {
            format!("{}.exe", base)
        } else {
            base
        }
    }

    /// Packaged archive file name, always a zip named after the binary
    pub fn archive_filename(&self, params: &BuildParameters) -> String {
        format!("{}.zip", self.base_name(params))
    }

    fn random_suffix(&self) -> u32 {
        rand::thread_rng().gen_range(self.suffixes.clone())
    }

    /// Claim a fresh attempt directory and derive the artifact paths in it
    pub async fn allocate(&self, params: &BuildParameters) -> KilnResult<ArtifactPaths> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            KilnError::storage(&self.root, format!("creating storage root: {}", e))
        })?;

        let dir = loop {
            let prefix = Utc::now().format("%y%m%d%H%M%S").to_string();
            let candidate = self.root.join(format!("{}{}", prefix, self.random_suffix()));

            match fs::create_dir(&candidate).await {
                Ok(()) => break candidate,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Attempt directory {} taken, retrying", candidate.display());
                }
                Err(e) => {
                    return Err(KilnError::storage(
                        &candidate,
                        format!("creating attempt directory: {}", e),
                    ))
                }
            }
        };

        let archive_filename = self.archive_filename(params);
        let paths = ArtifactPaths {
            binary_path: dir.join(self.binary_filename(params)),
            archive_path: dir.join(&archive_filename),
            archive_filename,
            dir,
        };

        debug!("Allocated attempt directory {}", paths.dir.display());
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn params(os: &str, arch: &str) -> BuildParameters {
        BuildParameters {
            os: os.to_string(),
            arch: arch.to_string(),
            variant: None,
            features: vec![],
        }
    }

    #[test]
    fn file_names() {
        let allocator = ArtifactPathAllocator::new("/builds", "caddy", 100..1000);

        let linux = params("linux", "amd64");
        assert_eq!(allocator.binary_filename(&linux), "caddy_linux_amd64_custom");
        assert_eq!(allocator.archive_filename(&linux), "caddy_linux_amd64_custom.zip");

        let windows = params("windows", "386");
        assert_eq!(allocator.binary_filename(&windows), "caddy_windows_386_custom.exe");
        assert_eq!(allocator.archive_filename(&windows), "caddy_windows_386_custom.zip");
    }

    #[tokio::test]
    async fn allocate_creates_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("builds");
        let allocator = ArtifactPathAllocator::new(&root, "build", 100..1000);

        let paths = allocator.allocate(&params("linux", "amd64")).await.unwrap();

        assert!(paths.dir.is_dir());
        assert_eq!(paths.dir.parent(), Some(root.as_path()));
        assert_eq!(paths.binary_path, paths.dir.join("build_linux_amd64_custom"));
        assert_eq!(paths.archive_path, paths.dir.join(&paths.archive_filename));

        let name = paths.dir.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name.len(), 15); // 12-digit timestamp + 3-digit suffix
        assert!(name.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_never_collide() {
        let temp = TempDir::new().unwrap();
        // Narrow range forces retries within the same second
        let allocator = ArtifactPathAllocator::new(temp.path(), "build", 10..90);

        let handles: Vec<_> = (0..60)
            .map(|_| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.allocate(&params("linux", "amd64")).await })
            })
            .collect();

        let mut dirs = HashSet::new();
        for handle in handles {
            let paths = handle.await.unwrap().unwrap();
            assert!(dirs.insert(paths.dir), "directory handed out twice");
        }
        assert_eq!(dirs.len(), 60);
    }

    #[tokio::test]
    async fn skips_occupied_directory() {
        let temp = TempDir::new().unwrap();
        let allocator = ArtifactPathAllocator::new(temp.path(), "build", 5..7);

        let first = allocator.allocate(&params("linux", "amd64")).await.unwrap();
        let second = allocator.allocate(&params("linux", "amd64")).await.unwrap();

        assert_ne!(first.dir, second.dir);
    }

    #[test]
    fn empty_range_is_widened() {
        let allocator = ArtifactPathAllocator::new("/builds", "build", 7..7);
        assert_eq!(allocator.random_suffix(), 7);
    }
}
