// src/config.rs
// Loads rpm-sigcheck configuration from /etc and user config; provides defaults.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, ValidateError};

const APP_DIR: &str = "rpm-sigcheck";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// File name prefix of the package carrying the trusted keyring.
    pub trust_anchor_prefix: String,
    /// File name prefix of the public keys inside the trust-anchor payload.
    pub key_file_prefix: String,
    /// Package file extension, without the dot.
    pub package_extension: String,
    /// Regexes a package build host must match at least one of.
    pub trusted_build_hosts: Vec<String>,
    /// Identities matching this are our own packages.
    pub project_identity: String,
    /// Identities matching this are upstream vendor packages.
    pub vendor_identity: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            trust_anchor_prefix: "simp-gpgkeys".to_string(),
            key_file_prefix: "RPM-GPG-KEY".to_string(),
            package_extension: "rpm".to_string(),
            trusted_build_hosts: [
                // SIMP
                r".*\.simp\.dev$",
                r".*\.simp-project\.net$",
                r".*\.simp-project\.com$",
                // EPEL
                r".*\.fedoraproject\.org$",
                // Puppet
                r".*\.puppetlabs\.net$",
                r"\.puppetlabs\.lan$",
                r"^mesos-jenkins-",
                // CentOS
                r".*\.centos\.org$",
                // PostgreSQL
                r"^koji-centos",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            project_identity: ".+@simp-project.org".to_string(),
            vendor_identity: ".+@(fedora|centos)".to_string(),
        }
    }
}

// On-disk layout. Every key is optional so files only override what they set.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    trust_anchor: TrustAnchorSection,
    #[serde(default)]
    packages: PackagesSection,
    #[serde(default)]
    build_hosts: BuildHostsSection,
    #[serde(default)]
    identities: IdentitiesSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrustAnchorSection {
    package_prefix: Option<String>,
    key_file_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackagesSection {
    extension: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildHostsSection {
    trusted: Option<Vec<String>>,
    /// Appended to `trusted` (or the defaults) instead of replacing them.
    extra: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdentitiesSection {
    project: Option<String>,
    vendor: Option<String>,
}

impl AppConfig {
    /// Builds the effective configuration.
    ///
    /// Order, lowest priority first: built-in defaults, `/etc/rpm-sigcheck/config.toml`,
    /// `$XDG_CONFIG_HOME/rpm-sigcheck/config.toml`, the `explicit` file, environment.
    /// Broken system or user files only warn; a broken explicit file is fatal.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = AppConfig::default();

        // 1) System config
        let sys_cfg = Path::new("/etc").join(APP_DIR).join(CONFIG_FILE);
        if sys_cfg.exists() {
            if let Err(e) = cfg.apply_file(&sys_cfg) {
                warn!("failed to load {}: {}", sys_cfg.display(), e);
            }
        }

        // 2) User config
        let user_cfg = user_config_dir().join(APP_DIR).join(CONFIG_FILE);
        if user_cfg.exists() {
            if let Err(e) = cfg.apply_file(&user_cfg) {
                warn!("failed to load {}: {}", user_cfg.display(), e);
            }
        }

        // 3) Command line --config
        if let Some(path) = explicit {
            cfg.apply_file(path)?;
        }

        // 4) Environment overrides (highest priority)
        cfg.apply_env(|key| env::var(key).ok());

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            ValidateError::Config(format!("could not read {}: {}", path.display(), e))
        })?;
        self.apply_str(&content)
            .map_err(|e| ValidateError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("loaded configuration from {}", path.display());
        Ok(())
    }

    fn apply_str(&mut self, content: &str) -> std::result::Result<(), toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;

        if let Some(v) = file.trust_anchor.package_prefix { self.trust_anchor_prefix = v; }
        if let Some(v) = file.trust_anchor.key_file_prefix { self.key_file_prefix = v; }
        if let Some(v) = file.packages.extension { self.package_extension = normalize_extension(&v); }
        if let Some(v) = file.build_hosts.trusted { self.trusted_build_hosts = v; }
        if let Some(v) = file.build_hosts.extra { self.trusted_build_hosts.extend(v); }
        if let Some(v) = file.identities.project { self.project_identity = v; }
        if let Some(v) = file.identities.vendor { self.vendor_identity = v; }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RPM_SIGCHECK_TRUST_ANCHOR_PREFIX") { self.trust_anchor_prefix = v; }
        if let Some(v) = lookup("RPM_SIGCHECK_KEY_FILE_PREFIX") { self.key_file_prefix = v; }
        if let Some(v) = lookup("RPM_SIGCHECK_PACKAGE_EXT") { self.package_extension = normalize_extension(&v); }
    }

    fn validate(&self) -> Result<()> {
        if self.trust_anchor_prefix.trim().is_empty() {
            return Err(ValidateError::Config("trust anchor package prefix is empty".into()));
        }
        if self.key_file_prefix.trim().is_empty() {
            return Err(ValidateError::Config("key file prefix is empty".into()));
        }
        if self.package_extension.is_empty() {
            return Err(ValidateError::Config("package extension is empty".into()));
        }
        Ok(())
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_string()
}

fn user_config_dir() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("~/.config").expand_home())
}

// Small helper to expand leading ~ in paths
trait ExpandHome {
    fn expand_home(self) -> PathBuf;
}

impl ExpandHome for PathBuf {
    fn expand_home(self) -> PathBuf {
        let s = self.to_string_lossy().to_string();
        if let Some(rest) = s.strip_prefix("~/") {
            if let Some(home) = dirs_next::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(s)
    }
}
