// src/validate.rs
// The validation pipeline: Key Extractor -> Package Scanner -> Signature Classifier.

use std::path::Path;

use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::classify::{CandidatePackage, ClassificationResult, Classifier, Rules};
use crate::config::AppConfig;
use crate::error::Result;
use crate::inspect::PackageInspector;
use crate::keys;
use crate::scan;
use crate::trust::TrustMap;

/// Everything a report needs from one run.
#[derive(Debug, Clone)]
pub struct Validation {
    pub trust: TrustMap,
    pub results: Vec<ClassificationResult>,
}

impl Validation {
    pub fn invalid_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_valid()).count()
    }
}

/// Runs the whole pipeline against an already resolved target directory.
pub fn validate(
    inspector: &dyn PackageInspector,
    target_dir: &Path,
    cfg: &AppConfig,
    progress: &ProgressBar,
) -> Result<Validation> {
    // Compile the patterns up front; a typo in the config should not cost an unpack.
    let rules = Rules::from_config(cfg)?;

    progress.set_message("Extracting trusted keys...");
    let trust = keys::load_trust_map(inspector, target_dir, cfg)?;

    progress.set_message("Scanning for packages...");
    let packages = scan::scan_packages(target_dir, &cfg.package_extension)?;

    progress.set_length(packages.len() as u64);
    let results = {
        let classifier = Classifier::new(&trust, rules);
        packages
            .iter()
            .map(|path| {
                if let Some(name) = path.file_name() {
                    progress.set_message(name.to_string_lossy().into_owned());
                }
                let result = classifier.classify(CandidatePackage::inspect(inspector, path));
                debug!("{}: {:?}", result.package.absolute_path.display(), result.status);
                progress.inc(1);
                result
            })
            .collect::<Vec<_>>()
    };
    progress.finish_and_clear();

    let validation = Validation { trust, results };
    info!(
        "checked {} packages, {} invalid",
        validation.results.len(),
        validation.invalid_count()
    );
    Ok(validation)
}
