//! Static security checks: sensitive file paths, hardcoded secrets and
//! known-vulnerable dependency pins.

pub mod packages;
pub mod rules;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{extension_bucket, relative, walk};
use crate::error::{ItemError, Result};
use packages::ManifestKind;
pub use rules::SecurityRules;
use rules::BINARY_EXTENSIONS;

/// Bytes inspected when sniffing a file for binary content.
const SNIFF_LEN: u64 = 512;

/// Serialized uppercase; parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            other => Err(format!("invalid severity '{other}' (expected LOW, MEDIUM or HIGH)")),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    SensitiveFile,
    HardcodedSecret,
    VulnerablePackage,
}

impl FindingKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FindingKind::SensitiveFile => "SENSITIVE_FILE",
            FindingKind::HardcodedSecret => "HARDCODED_SECRET",
            FindingKind::VulnerablePackage => "VULNERABLE_PACKAGE",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    #[serde(rename = "type")]
    pub kind: FindingKind,

    /// Relative file path, `path:line` for secrets, or
    /// `manifest: name@version` for dependencies
    pub location: String,

    pub description: String,

    pub severity: Severity,
}

/// Findings in detection order plus severity tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub issues: Vec<SecurityFinding>,
    pub total_issues: usize,
    pub high_severity: usize,
    pub medium_severity: usize,
    pub low_severity: usize,
}

impl SecurityReport {
    pub fn from_findings(issues: Vec<SecurityFinding>) -> Self {
        let mut report = SecurityReport {
            issues,
            total_issues: 0,
            high_severity: 0,
            medium_severity: 0,
            low_severity: 0,
        };
        report.tally();
        report
    }

    fn tally(&mut self) {
        self.high_severity = 0;
        self.medium_severity = 0;
        self.low_severity = 0;
        for issue in &self.issues {
            match issue.severity {
                Severity::High => self.high_severity += 1,
                Severity::Medium => self.medium_severity += 1,
                Severity::Low => self.low_severity += 1,
            }
        }
        self.total_issues = self.issues.len();
    }

    /// Drop findings below `min` and recount.
    pub fn retain_at_least(&mut self, min: Severity) {
        self.issues.retain(|issue| issue.severity >= min);
        self.tally();
    }

    pub fn count_of(&self, kind: FindingKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }
}

/// Run all three checks over `root`, concatenating sensitive files, then
/// secrets, then vulnerable packages.
///
/// Walk errors abort the analysis; an unreadable or malformed single file
/// is skipped.
pub fn analyze_security(root: &Path, rules: &SecurityRules) -> Result<SecurityReport> {
    let mut issues = find_sensitive_files(root, rules)?;
    issues.extend(find_hardcoded_secrets(root, rules)?);
    issues.extend(find_vulnerable_packages(root, rules)?);

    let report = SecurityReport::from_findings(issues);
    debug!(
        total = report.total_issues,
        high = report.high_severity,
        "security analysis done"
    );
    Ok(report)
}

/// One finding per non-directory entry whose lowercased relative path
/// contains a sensitive pattern; the first pattern in table order wins.
pub fn find_sensitive_files(root: &Path, rules: &SecurityRules) -> Result<Vec<SecurityFinding>> {
    let mut findings = Vec::new();

    for entry in walk(root) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let rel = relative(root, &entry);
        let lowered = rel.to_lowercase();
        if let Some(hit) = rules
            .sensitive_files
            .iter()
            .find(|p| lowered.contains(p.pattern.as_str()))
        {
            findings.push(SecurityFinding {
                kind: FindingKind::SensitiveFile,
                location: rel,
                description: hit.description.clone(),
                severity: hit.severity,
            });
        }
    }

    Ok(findings)
}

/// Scan regular, non-binary files line by line for secret patterns.
pub fn find_hardcoded_secrets(root: &Path, rules: &SecurityRules) -> Result<Vec<SecurityFinding>> {
    let mut findings = Vec::new();

    for entry in walk(root) {
        let entry = entry?;
        // Symlinks are not followed: their targets may lie outside the tree.
        if !entry.file_type().is_file() || is_binary(entry.path()) {
            continue;
        }

        let rel = relative(root, &entry);
        match scan_file(entry.path(), &rel, rules) {
            Ok(found) => findings.extend(found),
            Err(err) => debug!(error = %err, "skipping file in secret scan"),
        }
    }

    Ok(findings)
}

/// At most one finding per line: the first pattern that matches.
pub fn scan_file(
    path: &Path,
    rel: &str,
    rules: &SecurityRules,
) -> std::result::Result<Vec<SecurityFinding>, ItemError> {
    let file = File::open(path).map_err(|e| ItemError::unreadable(path, e))?;
    let reader = BufReader::new(file);
    let mut findings = Vec::new();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let mut line = line.map_err(|e| ItemError::unreadable(path, e))?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let text = String::from_utf8_lossy(&line);

        if let Some(hit) = rules.secrets.iter().find(|p| p.regex.is_match(&text)) {
            findings.push(SecurityFinding {
                kind: FindingKind::HardcodedSecret,
                location: format!("{rel}:{}", idx + 1),
                description: hit.description.clone(),
                severity: hit.severity,
            });
        }
    }

    Ok(findings)
}

/// Known binary extension, or a NUL byte in the first 512 bytes. Files that
/// cannot be opened are reported as text and fail later when scanned.
pub fn is_binary(path: &Path) -> bool {
    let ext = extension_bucket(path);
    if BINARY_EXTENSIONS.contains(&ext.as_str()) {
        return true;
    }

    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    if file.take(SNIFF_LEN).read_to_end(&mut head).is_err() {
        return false;
    }
    head.contains(&0)
}

/// Run the format-specific checker for every recognised manifest.
pub fn find_vulnerable_packages(
    root: &Path,
    rules: &SecurityRules,
) -> Result<Vec<SecurityFinding>> {
    let mut findings = Vec::new();

    for entry in walk(root) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let Some(kind) = entry
            .file_name()
            .to_str()
            .and_then(ManifestKind::from_file_name)
        else {
            continue;
        };

        let rel = relative(root, &entry);
        match packages::check_manifest(kind, entry.path(), &rel, rules) {
            Ok(found) => findings.extend(found),
            Err(err) => debug!(error = %err, "skipping manifest"),
        }
    }

    Ok(findings)
}
