// src/inspect.rs
// Package inspection: payload unpacking, GPG key listing and RPM header queries.
// RpmTools shells out to rpm2cpio, cpio, gpg2 and rpm.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, trace};

/// Field separator used in the `rpm --queryformat` line.
pub const FIELD_SEP: char = '|';

/// Header fields of one package as reported by the package tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name_version_release: String,
    /// Raw `SIGPGP` and `SIGGPG` text, space separated. Either may be `(none)`.
    pub signature: String,
    pub build_host: String,
}

impl PackageMetadata {
    /// Parses `NVR|SIGNATURES|BUILDHOST`. Returns `None` for empty or malformed output.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.lines().next()?.trim();
        let mut fields = line.splitn(3, FIELD_SEP);

        let name = fields.next()?.trim();
        let signature = fields.next()?.trim();
        let build_host = fields.next()?.trim();
        if name.is_empty() {
            return None;
        }

        Some(PackageMetadata {
            name_version_release: name.to_string(),
            signature: signature.to_string(),
            build_host: build_host.to_string(),
        })
    }
}

/// What the validator needs from the outside world. Injected so the pipeline can be
/// exercised without RPM tooling installed.
pub trait PackageInspector {
    /// Extracts the file payload of `package` into `dest`.
    fn unpack(&self, package: &Path, dest: &Path) -> io::Result<()>;

    /// Returns the colon-delimited key listing for a public key file.
    fn inspect_keys(&self, key_file: &Path) -> io::Result<String>;

    /// Returns the header metadata of `package`, or `None` if it could not be read.
    fn query_metadata(&self, package: &Path) -> Option<PackageMetadata>;
}

/// `cpio` arguments for extracting a payload under `dest` only.
///
/// Absolute member names are rewritten relative to `dest`.
fn cpio_args(dest: &Path) -> Vec<&OsStr> {
    vec![
        OsStr::new("-id"),
        OsStr::new("--no-absolute-filenames"),
        OsStr::new("-D"),
        dest.as_os_str(),
    ]
}

/// Inspector backed by the system RPM and GnuPG binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpmTools;

impl RpmTools {
    pub fn new() -> Self {
        RpmTools
    }
}

impl PackageInspector for RpmTools {
    fn unpack(&self, package: &Path, dest: &Path) -> io::Result<()> {
        debug!("unpacking {} into {}", package.display(), dest.display());

        let mut rpm2cpio = Command::new("rpm2cpio")
            .arg(package)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let payload = rpm2cpio.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "rpm2cpio produced no stdout")
        })?;

        let cpio = Command::new("cpio")
            .args(cpio_args(dest))
            .stdin(payload)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        let rpm2cpio = rpm2cpio.wait()?;

        if !rpm2cpio.success() || !cpio.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("payload extraction failed (rpm2cpio: {}, cpio: {})", rpm2cpio, cpio),
            ));
        }
        Ok(())
    }

    fn inspect_keys(&self, key_file: &Path) -> io::Result<String> {
        let output = Command::new("gpg2")
            .args(["-q", "--with-subkey-fingerprints", "--with-key-data"])
            .arg(key_file)
            .stderr(Stdio::null())
            .output()?;
        trace!("gpg2 exited with {} for {}", output.status, key_file.display());
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn query_metadata(&self, package: &Path) -> Option<PackageMetadata> {
        let query = format!(
            "%{{NAME}}-%{{VERSION}}-%{{RELEASE}}{sep}%{{SIGPGP:pgpsig}} %{{SIGGPG:pgpsig}}{sep}%{{BUILDHOST}}\\n",
            sep = FIELD_SEP
        );
        let output = Command::new("rpm")
            .args(["-qp", "--qf", query.as_str()])
            .arg(package)
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) => {
                let text = String::from_utf8_lossy(&out.stdout);
                let parsed = PackageMetadata::parse(&text);
                if parsed.is_none() {
                    debug!("rpm returned no usable metadata for {}", package.display());
                }
                parsed
            }
            Err(e) => {
                debug!("could not run rpm for {}: {}", package.display(), e);
                None
            }
        }
    }
}
