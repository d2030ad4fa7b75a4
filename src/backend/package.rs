//! Archive packaging for compiled binaries

use crate::error::{KilnError, KilnResult};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Package `binary` into a single-entry zip at `archive` and fsync it
pub async fn package_binary(binary: &Path, archive: &Path) -> KilnResult<()> {
    let binary = binary.to_path_buf();
    let archive = archive.to_path_buf();

    let target = archive.clone();
    tokio::task::spawn_blocking(move || write_archive(&binary, &archive))
        .await
        .map_err(|e| KilnError::Package {
            path: target,
            reason: format!("packaging task failed: {}", e),
        })?
}

fn write_archive(binary: &Path, archive: &Path) -> KilnResult<()> {
    let package_err = |reason: String| KilnError::Package {
        path: archive.to_path_buf(),
        reason,
    };

    let mut input = File::open(binary)
        .map_err(|e| KilnError::storage(binary, format!("opening binary: {}", e)))?;

    let entry_name = binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| package_err("binary path has no file name".to_string()))?;

    let output = File::create(archive).map_err(|e| package_err(e.to_string()))?;
    let mut writer = ZipWriter::new(output);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);

    writer
        .start_file(entry_name, options)
        .map_err(|e| package_err(e.to_string()))?;
    io::copy(&mut input, &mut writer).map_err(|e| package_err(e.to_string()))?;

    let output = writer.finish().map_err(|e| package_err(e.to_string()))?;
    output.sync_all().map_err(|e| package_err(e.to_string()))?;

    debug!("Packaged {} into {}", binary.display(), archive.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn packages_single_entry() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("build_linux_amd64_custom");
        let archive = dir.path().join("build_linux_amd64_custom.zip");
        std::fs::write(&binary, b"\x7fELF fake binary").unwrap();

        package_binary(&binary, &archive).await.unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);

        let mut entry = zip.by_index(0).unwrap();
        assert_eq!(entry.name(), "build_linux_amd64_custom");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"\x7fELF fake binary");
    }

    #[tokio::test]
    async fn missing_binary_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let err = package_binary(&dir.path().join("missing"), &dir.path().join("out.zip"))
            .await
            .unwrap_err();

        assert!(matches!(err, KilnError::Storage { .. }));
    }
}
