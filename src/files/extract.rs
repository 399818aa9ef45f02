//! Archive extraction.
//!
//! Extraction itself is delegated to the `7z` binary, driven like any other
//! external tool. Samples are inert files; single-sample extractions get
//! their execute bits stripped so nothing can be launched by accident.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::stream::{self, StreamExt};
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::{ARCHIVE_PASSWORD, EXTRACT_WORKERS};
use crate::core::{MalaError, Result};

const SEVENZIP_BIN: &str = "7z";

/// Where an archive lands when extracted: the destination directory joined
/// with the archive basename minus its `.7z` extension.
pub fn extraction_target(archive: &Path, dest_dir: &Path) -> PathBuf {
    let basename = archive
        .file_name()
        .map(|n| n.to_string_lossy().replace(".7z", ""))
        .unwrap_or_default();
    dest_dir.join(basename)
}

/// Count the entries an archive declares, via `7z l`.
pub async fn archive_file_count(archive: &Path) -> Result<i32> {
    let output = Command::new(SEVENZIP_BIN)
        .args(["l", "-slt", "-ba"])
        .arg(format!("-p{ARCHIVE_PASSWORD}"))
        .arg(archive)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;
    let listing = String::from_utf8_lossy(&output.stdout);
    Ok(listing
        .lines()
        .filter(|line| line.starts_with("Path = "))
        .count() as i32)
}

/// Extract one archive into the destination directory unless its target
/// already exists. Package archives unpack a whole directory; everything
/// else is a single sample whose mode is forced to 0o644.
pub async fn extract_archive(archive: &Path, dest_dir: &Path, package: bool) -> Result<()> {
    let target = extraction_target(archive, dest_dir);
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        debug!("Already extracted: {}", target.display());
        return Ok(());
    }

    let status = Command::new(SEVENZIP_BIN)
        .arg("x")
        .arg(format!("-p{ARCHIVE_PASSWORD}"))
        .arg("-y")
        .arg(format!("-o{}", dest_dir.display()))
        .arg(archive)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        return Err(MalaError::Extraction {
            path: archive.to_path_buf(),
            reason: format!("7z exited with {status}"),
        });
    }

    if !package {
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::Permissions::from_mode(0o644)
        };
        if let Err(e) = tokio::fs::set_permissions(&target, mode).await {
            debug!("Could not chmod {}: {e}", target.display());
        }
    }
    Ok(())
}

/// Extract a batch of archives, two at a time (extraction is disk-bound).
/// Failures are logged and the archive is dropped from the work set; the
/// surviving archives come back sorted.
pub async fn extract_all(archives: Vec<PathBuf>, dest_dir: &Path, package: bool) -> Vec<PathBuf> {
    let total = archives.len();
    let survivors = stream::iter(archives.into_iter().map(|archive| async move {
        match extract_archive(&archive, dest_dir, package).await {
            Ok(()) => Some(archive),
            Err(e) => {
                error!("Failed to extract {}: {e}", archive.display());
                None
            }
        }
    }))
    .buffer_unordered(EXTRACT_WORKERS)
    .collect::<Vec<_>>()
    .await;

    let mut kept: Vec<PathBuf> = survivors.into_iter().flatten().collect();
    kept.sort();
    debug!("Extracted {} of {total} archives", kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn target_strips_the_archive_extension() {
        let target = extraction_target(
            Path::new("/malware/incoming/batch-0042.7z"),
            Path::new("/malware/extracted"),
        );
        assert_eq!(target, Path::new("/malware/extracted/batch-0042"));
    }

    #[tokio::test]
    async fn existing_target_short_circuits() {
        let dest = TempDir::new().unwrap();
        std::fs::create_dir(dest.path().join("batch-0001")).unwrap();
        // The archive does not exist; only the target check keeps this Ok.
        let result =
            extract_archive(Path::new("/nonexistent/batch-0001.7z"), dest.path(), true).await;
        assert!(result.is_ok());
    }
}
