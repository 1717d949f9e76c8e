// src/classify.rs
// Signature Classifier: turns each package's header metadata into a valid/invalid verdict.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Regex, RegexSet};

use crate::config::AppConfig;
use crate::error::{Result, ValidateError};
use crate::inspect::{PackageInspector, PackageMetadata};
use crate::trust::{normalize_key_id, TrustMap};

pub const NOT_SIGNED: &str = "Not Signed";

/// One package file as reported by the package tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePackage {
    pub absolute_path: PathBuf,
    pub name_version_release: String,
    pub signature_key_id: Option<String>,
    pub build_host: String,
}

impl CandidatePackage {
    /// Queries `path` through the inspector. Unreadable packages come back unsigned
    /// with an empty build host and the file name standing in for the NVR.
    pub fn inspect(inspector: &dyn PackageInspector, path: &Path) -> Self {
        let meta = inspector.query_metadata(path).unwrap_or_else(|| PackageMetadata {
            name_version_release: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ..Default::default()
        });
        Self::from_metadata(path, meta)
    }

    pub fn from_metadata(path: &Path, meta: PackageMetadata) -> Self {
        CandidatePackage {
            absolute_path: path.to_path_buf(),
            name_version_release: meta.name_version_release,
            signature_key_id: signature_key_id(&meta.signature),
            build_host: meta.build_host,
        }
    }
}

/// Pulls the `Key ID <hex>` token out of rpm's pgpsig text, uppercased.
pub fn signature_key_id(signature: &str) -> Option<String> {
    static KEY_ID: OnceLock<Regex> = OnceLock::new();
    let re = KEY_ID.get_or_init(|| Regex::new(r"Key ID (\S+)").expect("static regex"));
    re.captures(signature).map(|c| normalize_key_id(&c[1]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Valid,
    Invalid,
}

/// Who a validly signed package belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackageKind {
    /// Signed with the project's own key.
    Simp,
    /// Signed by a known upstream vendor.
    Other,
    /// Anything else we trust: third-party dependencies.
    SimpDep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub package: CandidatePackage,
    pub status: Status,
    pub reasons: Vec<String>,
    pub owning_identity: Option<String>,
    /// Only set for valid packages.
    pub kind: Option<PackageKind>,
}

impl ClassificationResult {
    pub fn is_valid(&self) -> bool {
        self.status == Status::Valid
    }

    pub fn name(&self) -> &str {
        &self.package.name_version_release
    }
}

/// Trusted build infrastructure.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    patterns: RegexSet,
}

impl HostPolicy {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        // Compile one by one first so the error names the offending pattern.
        for p in &patterns {
            compile(p)?;
        }
        let patterns = RegexSet::new(&patterns).map_err(|source| ValidateError::Pattern {
            pattern: patterns.join(" | "),
            source,
        })?;
        Ok(HostPolicy { patterns })
    }

    pub fn is_trusted(&self, host: &str) -> bool {
        self.patterns.is_match(host)
    }
}

/// Identity patterns used to split valid packages into kinds.
#[derive(Debug, Clone)]
pub struct IdentityRules {
    project: Regex,
    vendor: Regex,
}

impl IdentityRules {
    pub fn new(project: &str, vendor: &str) -> Result<Self> {
        Ok(IdentityRules {
            project: compile(project)?,
            vendor: compile(vendor)?,
        })
    }

    pub fn kind_of(&self, identity: &str) -> PackageKind {
        if self.project.is_match(identity) {
            PackageKind::Simp
        } else if self.vendor.is_match(identity) {
            PackageKind::Other
        } else {
            PackageKind::SimpDep
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ValidateError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Host and identity patterns compiled from the configuration.
#[derive(Debug, Clone)]
pub struct Rules {
    pub hosts: HostPolicy,
    pub identities: IdentityRules,
}

impl Rules {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Rules {
            hosts: HostPolicy::new(&cfg.trusted_build_hosts)?,
            identities: IdentityRules::new(&cfg.project_identity, &cfg.vendor_identity)?,
        })
    }
}

/// Classifies packages against a trust map. Holds no state between calls.
pub struct Classifier<'a> {
    trust: &'a TrustMap,
    rules: Rules,
}

impl<'a> Classifier<'a> {
    pub fn new(trust: &'a TrustMap, rules: Rules) -> Self {
        Classifier { trust, rules }
    }

    pub fn classify(&self, package: CandidatePackage) -> ClassificationResult {
        let mut reasons = Vec::new();
        let mut owning_identity = None;

        match &package.signature_key_id {
            None => reasons.push(NOT_SIGNED.to_string()),
            Some(key_id) => match self.trust.identity(key_id) {
                Some(identity) => owning_identity = Some(identity.to_string()),
                None => reasons.push(format!("Unknown Key => {}", normalize_key_id(key_id))),
            },
        }

        // Provenance is checked no matter what the signature said.
        if !self.rules.hosts.is_trusted(&package.build_host) {
            reasons.push(format!("Invalid Build Host: {}", package.build_host));
        }

        let status = if reasons.is_empty() { Status::Valid } else { Status::Invalid };
        let kind = match (status, &owning_identity) {
            (Status::Valid, Some(identity)) => Some(self.rules.identities.kind_of(identity)),
            _ => None,
        };

        ClassificationResult {
            package,
            status,
            reasons,
            owning_identity,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustedKey;

    const SIMP_ID: &str = "releng@simp-project.org";

    fn trust() -> TrustMap {
        vec![
            TrustedKey::new("ABCD1234", SIMP_ID),
            TrustedKey::new("5A2F1C09", "EPEL (7) <epel@fedoraproject.org>"),
            TrustedKey::new("4BD6EC30", "Puppet Labs Release Key <info@puppetlabs.com>"),
        ]
        .into_iter()
        .collect()
    }

    fn classifier(trust: &TrustMap) -> Classifier<'_> {
        Classifier::new(trust, Rules::from_config(&AppConfig::default()).unwrap())
    }

    fn package(name: &str, key: Option<&str>, host: &str) -> CandidatePackage {
        CandidatePackage {
            absolute_path: PathBuf::from(format!("/iso/SIMP/noarch/{}.rpm", name)),
            name_version_release: name.to_string(),
            signature_key_id: key.map(str::to_string),
            build_host: host.to_string(),
        }
    }

    #[test]
    fn trusted_key_on_trusted_host_is_valid() {
        let trust = trust();
        let result = classifier(&trust).classify(package("foo-1.0-1", Some("ABCD1234"), "build1.simp.dev"));
        assert_eq!(result.status, Status::Valid);
        assert!(result.reasons.is_empty());
        assert_eq!(result.owning_identity.as_deref(), Some(SIMP_ID));
        assert_eq!(result.kind, Some(PackageKind::Simp));
    }

    #[test]
    fn unsigned_is_invalid_regardless_of_host() {
        let trust = trust();
        let c = classifier(&trust);

        let trusted_host = c.classify(package("bar-2.0-1", None, "build1.simp.dev"));
        assert_eq!(trusted_host.status, Status::Invalid);
        assert_eq!(trusted_host.reasons, vec![NOT_SIGNED]);

        let bad_host = c.classify(package("bar-2.0-1", None, "laptop"));
        assert_eq!(bad_host.reasons, vec![NOT_SIGNED.to_string(), "Invalid Build Host: laptop".to_string()]);
        assert_eq!(bad_host.owning_identity, None);
    }

    #[test]
    fn unknown_key_is_reported_uppercase() {
        let trust = trust();
        let result = classifier(&trust).classify(package("baz-1-1", Some("ffff0000"), "build1.simp.dev"));
        assert_eq!(result.status, Status::Invalid);
        assert_eq!(result.reasons, vec!["Unknown Key => FFFF0000"]);
        assert_eq!(result.kind, None);
    }

    #[test]
    fn trusted_key_does_not_waive_bad_host() {
        let trust = trust();
        let result = classifier(&trust).classify(package("foo-1.0-1", Some("abcd1234"), "attacker.example.com"));
        assert_eq!(result.status, Status::Invalid);
        assert_eq!(result.reasons, vec!["Invalid Build Host: attacker.example.com"]);
        assert_eq!(result.owning_identity.as_deref(), Some(SIMP_ID));
        assert_eq!(result.kind, None);
    }

    #[test]
    fn upstream_build_hosts_are_trusted() {
        let policy = HostPolicy::new(&AppConfig::default().trusted_build_hosts).unwrap();
        for host in [
            "buildvm-12.phx2.fedoraproject.org",
            "x86-01.bsys.centos.org",
            "jenkins.delivery.puppetlabs.net",
            "mesos-jenkins-4f2a",
            "koji-centos7-x86-64-pgbuild",
            "ci.simp-project.com",
        ] {
            assert!(policy.is_trusted(host), "{} should be trusted", host);
        }
        for host in ["", "localhost", "fedoraproject.org.evil.com", "simp.dev"] {
            assert!(!policy.is_trusted(host), "{} should not be trusted", host);
        }
    }

    #[test]
    fn valid_packages_are_sorted_into_kinds() {
        let trust = trust();
        let c = classifier(&trust);

        let epel = c.classify(package("htop-2.2.0-3.el7", Some("5A2F1C09"), "buildhw-02.phx2.fedoraproject.org"));
        assert_eq!(epel.kind, Some(PackageKind::Other));

        // Only fedora/centos count as vendors.
        let puppet = c.classify(package("puppet-agent-5.5.10-1.el7", Some("4BD6EC30"), "mesos-jenkins-1"));
        assert_eq!(puppet.kind, Some(PackageKind::SimpDep));
    }

    #[test]
    fn key_id_is_taken_from_either_signature_field() {
        assert_eq!(
            signature_key_id("(none) RSA/SHA1, Mon 09 Apr 2018, Key ID c64e9f3b2a1d0e47"),
            Some("C64E9F3B2A1D0E47".to_string())
        );
        assert_eq!(signature_key_id("(none) (none)"), None);
    }

    #[test]
    fn unreadable_package_degrades_to_unsigned() {
        let inspector = crate::keys::tests::FakeInspector::default();
        let pkg = CandidatePackage::inspect(&inspector, Path::new("/iso/broken-1.0-1.noarch.rpm"));
        assert_eq!(pkg.name_version_release, "broken-1.0-1.noarch.rpm");
        assert_eq!(pkg.signature_key_id, None);
        assert_eq!(pkg.build_host, "");

        let trust = trust();
        let result = classifier(&trust).classify(pkg);
        assert_eq!(result.reasons, vec![NOT_SIGNED.to_string(), "Invalid Build Host: ".to_string()]);
    }

    #[test]
    fn classification_is_repeatable() {
        let trust = trust();
        let c = classifier(&trust);
        let input = vec![
            package("foo-1.0-1", Some("ABCD1234"), "build1.simp.dev"),
            package("bar-2.0-1", None, "build1.simp.dev"),
            package("baz-1-1", Some("FFFF0000"), "nowhere"),
        ];
        let first: Vec<_> = input.iter().cloned().map(|p| c.classify(p)).collect();
        let second: Vec<_> = input.into_iter().map(|p| c.classify(p)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn bad_pattern_is_a_configuration_error() {
        assert!(matches!(HostPolicy::new(["(unclosed"]), Err(ValidateError::Pattern { .. })));
        assert!(IdentityRules::new("[", ".*").is_err());
    }
}
