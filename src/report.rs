// src/report.rs
// Report Emitter: renders classification results and decides the exit status.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use clap::ValueEnum;

use crate::classify::{ClassificationResult, PackageKind};
use crate::trust::TrustMap;

pub const EXIT_OK: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_INVALID: u8 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ReportMode {
    /// Invalid RPMs
    #[default]
    Invalid,
    /// Valid RPMs
    Valid,
    /// GPG keys that do not match any package
    UnusedKeys,
    /// List SIMP packages
    SimpPkgs,
    /// List SIMP dependency packages
    SimpDepPkgs,
    /// List other vendor packages
    OtherPkgs,
}

/// Rendered output plus the exit code that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub exit_code: u8,
}

pub fn render(mode: ReportMode, results: &[ClassificationResult], trust: &TrustMap) -> Report {
    match mode {
        ReportMode::Invalid => invalid_report(results),
        ReportMode::Valid => ok(valid_report(results)),
        ReportMode::UnusedKeys => ok(unused_keys_report(results, trust)),
        ReportMode::SimpPkgs => ok(kind_report(results, PackageKind::Simp)),
        ReportMode::SimpDepPkgs => ok(kind_report(results, PackageKind::SimpDep)),
        ReportMode::OtherPkgs => ok(kind_report(results, PackageKind::Other)),
    }
}

/// Exit code for `--quiet`: 0 when everything validated, 1 otherwise.
pub fn quiet_exit_code(results: &[ClassificationResult]) -> u8 {
    if results.iter().all(ClassificationResult::is_valid) {
        EXIT_OK
    } else {
        EXIT_ERROR
    }
}

fn ok(text: String) -> Report {
    Report { text, exit_code: EXIT_OK }
}

fn invalid_report(results: &[ClassificationResult]) -> Report {
    // Same NVR found twice (e.g. in two repos) collapses into one entry.
    let mut invalid: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for result in results.iter().filter(|r| !r.is_valid()) {
        let reasons = invalid.entry(result.name()).or_default();
        for reason in &result.reasons {
            if !reasons.contains(&reason.as_str()) {
                reasons.push(reason);
            }
        }
    }

    if invalid.is_empty() {
        return ok("No invalid RPMs found!\n".to_string());
    }

    let mut out = String::from("Invalid RPMs:\n");
    for (name, reasons) in &invalid {
        let _ = writeln!(out, "* {}:", name);
        for reason in reasons {
            let _ = writeln!(out, "  * {}", reason);
        }
    }
    Report { text: out, exit_code: EXIT_INVALID }
}

fn valid_report(results: &[ClassificationResult]) -> String {
    // identity -> (first key seen, package names)
    let mut by_identity: BTreeMap<&str, (&str, BTreeSet<&str>)> = BTreeMap::new();
    for result in results.iter().filter(|r| r.is_valid()) {
        let (Some(identity), Some(key)) = (
            result.owning_identity.as_deref(),
            result.package.signature_key_id.as_deref(),
        ) else {
            continue;
        };
        by_identity
            .entry(identity)
            .or_insert_with(|| (key, BTreeSet::new()))
            .1
            .insert(result.name());
    }

    let mut out = String::new();
    for (identity, (key, names)) in &by_identity {
        let _ = writeln!(out, "* {} {}\n", identity, key);
        for name in names {
            let _ = writeln!(out, "  - {}", name);
        }
        out.push('\n');
    }
    out
}

fn unused_keys_report(results: &[ClassificationResult], trust: &TrustMap) -> String {
    let used: BTreeSet<&str> = results
        .iter()
        .filter(|r| r.is_valid())
        .filter_map(|r| r.owning_identity.as_deref())
        .collect();

    let unused = trust.unused(&used);
    if unused.is_empty() {
        return "All Keys Used\n".to_string();
    }

    let mut out = String::from("Unused Keys:\n");
    for (key_id, identity) in unused {
        let _ = writeln!(out, "  * {} => {}", key_id, identity);
    }
    out
}

fn kind_report(results: &[ClassificationResult], kind: PackageKind) -> String {
    let names: BTreeSet<&str> = results
        .iter()
        .filter(|r| r.kind == Some(kind))
        .map(ClassificationResult::name)
        .collect();

    names.into_iter().fold(String::new(), |mut out, name| {
        out.push_str(name);
        out.push('\n');
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CandidatePackage, Classifier, Rules};
    use crate::config::AppConfig;
    use crate::trust::TrustedKey;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn trust() -> TrustMap {
        vec![
            TrustedKey::new("ABCD1234", "releng@simp-project.org"),
            TrustedKey::new("ABCD5678", "releng@simp-project.org"),
            TrustedKey::new("5A2F1C09", "epel@fedoraproject.org"),
            TrustedKey::new("4BD6EC30", "info@puppetlabs.com"),
            TrustedKey::new("B0B0B0B0", "nobody@example.com"),
        ]
        .into_iter()
        .collect()
    }

    fn results(trust: &TrustMap) -> Vec<ClassificationResult> {
        let pkgs = [
            ("simp-6.2.0-0.el7", Some("ABCD1234"), "build1.simp.dev"),
            ("simp-adapter-0.1.0-0.el7", Some("ABCD1234"), "build1.simp.dev"),
            ("htop-2.2.0-3.el7", Some("5A2F1C09"), "buildhw-02.phx2.fedoraproject.org"),
            ("puppet-agent-5.5.10-1.el7", Some("4BD6EC30"), "mesos-jenkins-1"),
            ("bar-2.0-1", None, "build1.simp.dev"),
            ("baz-1-1", Some("FFFF0000"), "build1.simp.dev"),
            ("evil-1-1", Some("ABCD1234"), "attacker.example.com"),
        ];
        let classifier = Classifier::new(trust, Rules::from_config(&AppConfig::default()).unwrap());
        pkgs.iter()
            .map(|(name, key, host)| {
                classifier.classify(CandidatePackage {
                    absolute_path: PathBuf::from(format!("/iso/{}.rpm", name)),
                    name_version_release: name.to_string(),
                    signature_key_id: key.map(str::to_string),
                    build_host: host.to_string(),
                })
            })
            .collect()
    }

    #[test]
    fn invalid_report_lists_reasons_and_exits_two() {
        let trust = trust();
        let report = render(ReportMode::Invalid, &results(&trust), &trust);
        assert_eq!(
            report.text,
            "Invalid RPMs:\n\
             * bar-2.0-1:\n  * Not Signed\n\
             * baz-1-1:\n  * Unknown Key => FFFF0000\n\
             * evil-1-1:\n  * Invalid Build Host: attacker.example.com\n"
        );
        assert_eq!(report.exit_code, EXIT_INVALID);
    }

    #[test]
    fn invalid_report_when_all_clean() {
        let trust = trust();
        let clean: Vec<_> = results(&trust).into_iter().filter(|r| r.is_valid()).collect();
        let report = render(ReportMode::Invalid, &clean, &trust);
        assert_eq!(report.text, "No invalid RPMs found!\n");
        assert_eq!(report.exit_code, EXIT_OK);
    }

    #[test]
    fn duplicate_names_merge_reasons() {
        let trust = trust();
        let mut all = results(&trust);
        let mut dup = all.iter().find(|r| r.name() == "bar-2.0-1").unwrap().clone();
        dup.reasons.push("Invalid Build Host: laptop".to_string());
        all.push(dup);

        let report = render(ReportMode::Invalid, &all, &trust);
        assert!(report
            .text
            .contains("* bar-2.0-1:\n  * Not Signed\n  * Invalid Build Host: laptop\n"));
    }

    #[test]
    fn valid_report_groups_by_identity() {
        let trust = trust();
        let report = render(ReportMode::Valid, &results(&trust), &trust);
        assert_eq!(
            report.text,
            "* epel@fedoraproject.org 5A2F1C09\n\n  - htop-2.2.0-3.el7\n\n\
             * info@puppetlabs.com 4BD6EC30\n\n  - puppet-agent-5.5.10-1.el7\n\n\
             * releng@simp-project.org ABCD1234\n\n  - simp-6.2.0-0.el7\n  - simp-adapter-0.1.0-0.el7\n\n"
        );
        assert_eq!(report.exit_code, EXIT_OK);
    }

    #[test]
    fn unused_keys_are_identities_without_valid_packages() {
        let trust = trust();
        let report = render(ReportMode::UnusedKeys, &results(&trust), &trust);
        assert_eq!(report.text, "Unused Keys:\n  * B0B0B0B0 => nobody@example.com\n");
    }

    #[test]
    fn all_keys_used() {
        let trust: TrustMap = vec![TrustedKey::new("ABCD1234", "releng@simp-project.org")]
            .into_iter()
            .collect();
        let report = render(ReportMode::UnusedKeys, &results(&trust), &trust);
        assert_eq!(report.text, "All Keys Used\n");
    }

    #[test]
    fn kind_reports() {
        let trust = trust();
        let results = results(&trust);
        assert_eq!(
            render(ReportMode::SimpPkgs, &results, &trust).text,
            "simp-6.2.0-0.el7\nsimp-adapter-0.1.0-0.el7\n"
        );
        assert_eq!(render(ReportMode::OtherPkgs, &results, &trust).text, "htop-2.2.0-3.el7\n");
        assert_eq!(
            render(ReportMode::SimpDepPkgs, &results, &trust).text,
            "puppet-agent-5.5.10-1.el7\n"
        );
    }

    #[test]
    fn quiet_exit_codes() {
        let trust = trust();
        let all = results(&trust);
        assert_eq!(quiet_exit_code(&all), EXIT_ERROR);

        let clean: Vec<_> = all.into_iter().filter(|r| r.is_valid()).collect();
        assert_eq!(quiet_exit_code(&clean), EXIT_OK);
        assert_eq!(quiet_exit_code(&[]), EXIT_OK);
    }

    #[test]
    fn report_type_names() {
        let names: Vec<_> = ReportMode::value_variants()
            .iter()
            .filter_map(|m| m.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["invalid", "valid", "unused_keys", "simp_pkgs", "simp_dep_pkgs", "other_pkgs"]
        );
    }
}
