// src/keys.rs
// Key Extractor: unpacks the trust-anchor package and builds the TrustMap from its GPG keys.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{Result, ValidateError};
use crate::inspect::PackageInspector;
use crate::scan::{find_files, has_extension};
use crate::trust::{parse_key_listing, TrustMap};

/// Finds the single trust-anchor package (`<prefix>*.<ext>`) under `target_dir`.
pub fn find_trust_anchor(target_dir: &Path, prefix: &str, extension: &str) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = find_files(target_dir, |name| {
        name.starts_with(prefix) && has_extension(name, extension)
    })?
    .into_iter()
    .collect();

    match found.len() {
        0 => Err(ValidateError::TrustAnchorMissing {
            prefix: prefix.to_string(),
            dir: target_dir.to_path_buf(),
        }),
        1 => Ok(found.remove(0)),
        _ => Err(ValidateError::TrustAnchorAmbiguous {
            prefix: prefix.to_string(),
            dir: target_dir.to_path_buf(),
            found,
        }),
    }
}

/// Builds the trust map from the keys shipped inside `anchor`.
///
/// The payload is unpacked into a temporary directory that is removed when this
/// returns, whatever the outcome.
pub fn extract_trust_map(
    inspector: &dyn PackageInspector,
    anchor: &Path,
    key_file_prefix: &str,
) -> Result<TrustMap> {
    let workdir = tempfile::Builder::new().prefix("rpm-sigcheck-").tempdir()?;
    debug!("extracting {} into {}", anchor.display(), workdir.path().display());

    // A failed unpack is only fatal if it leaves us without key files.
    if let Err(e) = inspector.unpack(anchor, workdir.path()) {
        warn!("unpacking {} failed: {}", anchor.display(), e);
    }

    let key_files = find_files(workdir.path(), |name| name.starts_with(key_file_prefix))?;
    if key_files.is_empty() {
        return Err(ValidateError::NoVendorKeys {
            prefix: key_file_prefix.to_string(),
            package: anchor.to_path_buf(),
        });
    }

    let mut trust = TrustMap::new();
    for key_file in &key_files {
        let name = key_file.file_name().unwrap_or_default().to_string_lossy();

        let listing = match inspector.inspect_keys(key_file) {
            Ok(text) => text,
            Err(e) => {
                warn!("could not inspect {}: {}", name, e);
                continue;
            }
        };

        match parse_key_listing(&listing) {
            Some(keys) => {
                for key in &keys {
                    debug!("{}: {} => {}", name, key.key_id, key.identity);
                }
                trust.extend(keys);
            }
            None => warn!("{} has no user ID, skipping", name),
        }
    }

    if trust.is_empty() {
        return Err(ValidateError::EmptyTrustMap(anchor.to_path_buf()));
    }

    info!("loaded {} trusted key IDs from {} key files", trust.len(), key_files.len());
    Ok(trust)
}

/// Locates the trust anchor under `target_dir` and extracts its keys.
pub fn load_trust_map(
    inspector: &dyn PackageInspector,
    target_dir: &Path,
    cfg: &AppConfig,
) -> Result<TrustMap> {
    let anchor = find_trust_anchor(target_dir, &cfg.trust_anchor_prefix, &cfg.package_extension)?;
    info!("using trust anchor {}", anchor.display());
    extract_trust_map(inspector, &anchor, &cfg.key_file_prefix)
}
