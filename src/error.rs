// src/error.rs
// Pipeline setup failures. Anything in here ends the run with exit code 1.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("Could not find directory at {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Could not find {prefix} RPM at {}", .dir.display())]
    TrustAnchorMissing { prefix: String, dir: PathBuf },

    #[error("Found {} {prefix} RPMs under {}, expected exactly one:\n  * {}", .found.len(), .dir.display(), display_paths(.found))]
    TrustAnchorAmbiguous {
        prefix: String,
        dir: PathBuf,
        found: Vec<PathBuf>,
    },

    #[error("No {prefix}* key files found in {}", .package.display())]
    NoVendorKeys { prefix: String, package: PathBuf },

    #[error("No usable GPG keys could be read from {}", .0.display())]
    EmptyTrustMap(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed walking {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ValidateError {
    /// Errors about the target argument itself get the usage line appended.
    pub fn wants_usage(&self) -> bool {
        matches!(self, Self::TargetNotFound(_) | Self::NotADirectory(_))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n  * ")
}

pub type Result<T> = std::result::Result<T, ValidateError>;
