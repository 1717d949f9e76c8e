// src/scan.rs
// Package Scanner: finds candidate package files under the target directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, ValidateError};

/// Resolves the target argument to an absolute directory path.
///
/// Runs before anything else so a bad argument never gets as far as the keyring.
pub fn resolve_target_dir(target: &Path) -> Result<PathBuf> {
    if !target.exists() {
        return Err(ValidateError::TargetNotFound(target.to_path_buf()));
    }
    if !target.is_dir() {
        return Err(ValidateError::NotADirectory(target.to_path_buf()));
    }
    Ok(fs::canonicalize(target)?)
}

/// Recursively collects regular files under `root` whose name satisfies `accept`.
///
/// Names that are not valid UTF-8 are matched lossily, so they are still found.
///
/// Unreadable subdirectories are skipped with a warning; failing to read `root`
/// itself is an error.
pub fn find_files<F>(root: &Path, accept: F) -> Result<BTreeSet<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut found = BTreeSet::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(ValidateError::Walk { path: root.to_path_buf(), source: e });
            }
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if accept(&entry.file_name().to_string_lossy()) {
            found.insert(absolute(entry.path()));
        }
    }

    Ok(found)
}

/// `true` when `file_name` ends in `.<extension>`.
pub fn has_extension(file_name: &str, extension: &str) -> bool {
    file_name
        .strip_suffix(extension)
        .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
}

/// Every package file under `root`, sorted and deduplicated.
pub fn scan_packages(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let packages: Vec<PathBuf> = find_files(root, |name| has_extension(name, extension))?
        .into_iter()
        .collect();
    debug!("found {} .{} files under {}", packages.len(), extension, root.display());
    Ok(packages)
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
