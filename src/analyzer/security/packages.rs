use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::rules::{SecurityRules, VulnerablePackage};
use super::{FindingKind, SecurityFinding};
use crate::error::ItemError;

/// Dependency manifests recognised by exact file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    PackageJson,
    Requirements,
    GemfileLock,
    GoMod,
}

impl ManifestKind {
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "package.json" => Some(ManifestKind::PackageJson),
            "requirements.txt" => Some(ManifestKind::Requirements),
            "Gemfile.lock" => Some(ManifestKind::GemfileLock),
            "go.mod" => Some(ManifestKind::GoMod),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: Option<BTreeMap<String, String>>,
}

/// Plain string comparison, not semver: `"4.17.9" < "4.17.21"` is false.
pub fn is_below(version: &str, bound: &str) -> bool {
    version < bound
}

fn advisory<'a>(table: &'a [VulnerablePackage], name: &str) -> Option<&'a VulnerablePackage> {
    table.iter().find(|p| p.name == name)
}

fn finding(location: String, vuln: &VulnerablePackage) -> SecurityFinding {
    SecurityFinding {
        kind: FindingKind::VulnerablePackage,
        location,
        description: format!("{}. Update to {}", vuln.advisory, vuln.fixed),
        severity: vuln.severity,
    }
}

/// Check one manifest. `rel` is its path relative to the scan root and
/// prefixes every finding's location.
pub fn check_manifest(
    kind: ManifestKind,
    path: &Path,
    rel: &str,
    rules: &SecurityRules,
) -> Result<Vec<SecurityFinding>, ItemError> {
    match kind {
        ManifestKind::PackageJson => check_package_json(path, rel, &rules.npm),
        ManifestKind::Requirements => check_requirements(path, rel, &rules.pypi),
        // No advisory tables for these yet.
        ManifestKind::GemfileLock | ManifestKind::GoMod => Ok(Vec::new()),
    }
}

fn check_package_json(
    path: &Path,
    rel: &str,
    table: &[VulnerablePackage],
) -> Result<Vec<SecurityFinding>, ItemError> {
    let data = fs::read(path).map_err(|e| ItemError::unreadable(path, e))?;
    let pkg: PackageJson =
        serde_json::from_slice(&data).map_err(|e| ItemError::malformed(path, e))?;

    let deps = pkg.dependencies.unwrap_or_default();
    let dev_deps = pkg.dev_dependencies.unwrap_or_default();

    // A dev pin identical to the runtime entry is reported once.
    let runtime = deps.iter().map(|(name, version)| (name, version, false));
    let dev = dev_deps
        .iter()
        .filter(|(name, version)| deps.get(*name) != Some(*version))
        .map(|(name, version)| (name, version, !deps.contains_key(name)));

    let mut findings = Vec::new();
    for (name, declared, dev_only) in runtime.chain(dev) {
        let Some(vuln) = advisory(table, name) else {
            continue;
        };
        let version = declared.strip_prefix(['^', '~']).unwrap_or(declared);
        if is_below(version, vuln.below) {
            let tag = if dev_only { " (dev)" } else { "" };
            findings.push(finding(format!("{rel}: {name}@{version}{tag}"), vuln));
        }
    }
    Ok(findings)
}

fn check_requirements(
    path: &Path,
    rel: &str,
    table: &[VulnerablePackage],
) -> Result<Vec<SecurityFinding>, ItemError> {
    let text = fs::read_to_string(path).map_err(|e| ItemError::unreadable(path, e))?;

    let mut findings = Vec::new();
    for line in text.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split("==").collect();
        let [name, version] = parts.as_slice() else {
            continue;
        };
        let (name, version) = (name.trim(), version.trim());

        if let Some(vuln) = advisory(table, name) {
            if is_below(version, vuln.below) {
                findings.push(finding(format!("{rel}: {name}=={version}"), vuln));
            }
        }
    }
    Ok(findings)
}
