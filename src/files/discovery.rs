//! Candidate file discovery.
//!
//! Two walk modes: extracted (every regular file that is not a `.7z`) and
//! archive (only `.7z` files). Results are deduplicated and sorted so chunk
//! contents are deterministic run to run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::core::Result;
use crate::db::{Dao, NewPackage};
use crate::files::extract::archive_file_count;

/// Fraction of a package's declared file count that must already be linked
/// to known samples for the package to count as ingested. Some archive
/// members are too small or too corrupt to hash, and some are shared with
/// earlier packages, so exact coverage is unattainable.
const PACKAGE_KNOWN_RATIO: f64 = 0.9;

fn is_7z(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "7z")
}

fn walk(root: &Path, want_archives: bool) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if is_7z(entry.path()) == want_archives {
            found.insert(entry.path().to_path_buf());
        }
    }
    found.into_iter().collect()
}

/// All non-archive regular files under `root`.
pub fn walk_samples(root: &Path) -> Vec<PathBuf> {
    walk(root, false)
}

/// All `.7z` archives under `root`.
pub fn walk_archives(root: &Path) -> Vec<PathBuf> {
    walk(root, true)
}

/// The package-known heuristic: the archive basename matches a t_package
/// row and at least [`PACKAGE_KNOWN_RATIO`] of its declared file count is
/// already linked to samples extracted under its directory.
pub async fn archive_known(dao: &mut Dao, archive: &Path) -> Result<bool> {
    let basename = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(row) = dao.search_package(&basename).await? else {
        info!("New archive {basename}.");
        return Ok(false);
    };

    let stripped = row.basename.replace(".7z", "");
    let known_files = dao.package_sample_count(&stripped).await?;
    if row.fcount > 0 {
        let known_ratio = known_files as f64 / f64::from(row.fcount);
        if known_ratio >= PACKAGE_KNOWN_RATIO {
            debug!(
                "Archive {basename} is {:.1}% known to the DB.",
                known_ratio * 100.0
            );
            return Ok(true);
        }
    }
    Ok(false)
}

/// Register an archive in t_package: MD5, size, declared file count,
/// ingestion timestamp.
pub async fn register_archive(dao: &mut Dao, archive: &Path) -> Result<i64> {
    let (md5, fsize) = crate::core::hashing::archive_digest(archive).await?;
    let fcount = archive_file_count(archive).await?;
    let package = NewPackage {
        md5,
        basename: archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: archive.to_string_lossy().into_owned(),
        fsize,
        date_ingested: chrono::Local::now().naive_local(),
        fcount,
    };
    dao.insert_package(&package).await
}

/// Package-mode filter over discovered archives: drop the ones the store
/// already knows, register the rest. Registration failures drop the
/// archive from the work set, like any other extraction-phase failure.
pub async fn filter_known_packages(dao: &mut Dao, archives: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut fresh = Vec::new();
    for archive in archives {
        match archive_known(dao, &archive).await {
            Ok(true) => continue,
            Ok(false) => match register_archive(dao, &archive).await {
                Ok(_) => fresh.push(archive),
                Err(e) => error!("Failed to register {}: {e}", archive.display()),
            },
            Err(e) => error!("Package lookup failed for {}: {e}", archive.display()),
        }
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walks_split_archives_from_samples() {
        let root = TempDir::new().unwrap();
        let sub = root.path().join("batch");
        fs::create_dir(&sub).unwrap();
        touch(&root.path().join("loose.bin"));
        touch(&sub.join("inner.dat"));
        touch(&sub.join("packed.7z"));

        let samples = walk_samples(root.path());
        assert_eq!(
            samples,
            vec![sub.join("inner.dat"), root.path().join("loose.bin")]
        );

        let archives = walk_archives(root.path());
        assert_eq!(archives, vec![sub.join("packed.7z")]);
    }

    #[test]
    fn walk_is_deterministic_and_deduplicated() {
        let root = TempDir::new().unwrap();
        for name in ["c.bin", "a.bin", "b.bin"] {
            touch(&root.path().join(name));
        }
        let first = walk_samples(root.path());
        let second = walk_samples(root.path());
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn empty_root_yields_nothing() {
        let root = TempDir::new().unwrap();
        assert!(walk_samples(root.path()).is_empty());
        assert!(walk_archives(root.path()).is_empty());
    }
}
