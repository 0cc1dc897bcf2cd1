//! The merged analysis result and the recommendations derived from it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::task::{self, JoinError};
use tracing::warn;

use crate::analyzer::{
    DirectoryReport, FindingKind, SecurityReport, SecurityRules, Severity, SizeOptions, SizeReport,
    analyze_directory, analyze_security, analyze_size,
};
use crate::error::Result;
use crate::render::format_size;

const MIB: u64 = 1024 * 1024;

/// Total unpacked size above which the image counts as large.
pub const LARGE_IMAGE_BYTES: u64 = 500 * MIB;

/// A single file above this size is called out by name.
pub const LARGE_FILE_BYTES: u64 = 100 * MIB;

/// Cumulative size above which a removable extension is reported.
pub const REMOVABLE_BUCKET_BYTES: u64 = 10 * MIB;

/// Extension buckets that rarely belong in a runtime image.
pub const REMOVABLE_EXTENSIONS: &[&str] = &[".zip", ".tar", ".gz", ".log", ".tmp"];

/// More layers than this triggers a squash recommendation.
pub const MAX_LAYERS: usize = 10;

pub const NO_RECOMMENDATIONS: &str = "No specific recommendations at this time";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Reference the user asked for (tarball path or image name)
    pub image: String,

    /// RFC 3339 capture time
    pub analyzed_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<DirectoryReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeReport>,

    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Knobs for one aggregate run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub verbose: bool,
    pub size_enabled: bool,
    pub size: SizeOptions,
    pub security_enabled: bool,
    pub min_severity: Severity,
    pub rules: Arc<SecurityRules>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            size_enabled: true,
            size: SizeOptions::default(),
            security_enabled: true,
            min_severity: Severity::Low,
            rules: SecurityRules::builtin(),
        }
    }
}

/// Run the three analyzers concurrently over `root` and merge the results.
///
/// Never fails: an analyzer that errors or panics leaves its sub-report
/// absent and is logged at warn level.
pub async fn analyze(image: &str, root: &Path, opts: &AnalyzeOptions) -> AnalysisReport {
    let analyzed_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    let root: Arc<PathBuf> = Arc::new(root.to_path_buf());

    let directory = {
        let root = Arc::clone(&root);
        let verbose = opts.verbose;
        task::spawn_blocking(move || analyze_directory(&root, verbose))
    };

    let security = {
        let root = Arc::clone(&root);
        let rules = Arc::clone(&opts.rules);
        let enabled = opts.security_enabled;
        let min = opts.min_severity;
        task::spawn_blocking(move || -> Result<Option<SecurityReport>> {
            if !enabled {
                return Ok(None);
            }
            let mut report = analyze_security(&root, &rules)?;
            report.retain_at_least(min);
            Ok(Some(report))
        })
    };

    let size = {
        let root = Arc::clone(&root);
        let enabled = opts.size_enabled;
        let size_opts = opts.size;
        task::spawn_blocking(move || -> Result<Option<SizeReport>> {
            if !enabled {
                return Ok(None);
            }
            analyze_size(&root, size_opts).map(Some)
        })
    };

    let (directory, security, size) = tokio::join!(directory, security, size);

    let mut report = AnalysisReport {
        image: image.to_string(),
        analyzed_at,
        directory: settle("directory", directory),
        security: settle("security", security).flatten(),
        size: settle("size", size).flatten(),
        recommendations: Vec::new(),
    };
    report.recommendations = recommendations(&report);
    report
}

fn settle<T>(analyzer: &str, joined: std::result::Result<Result<T>, JoinError>) -> Option<T> {
    match joined {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(analyzer, error = %err, "analyzer failed");
            None
        }
        Err(err) => {
            warn!(analyzer, error = %err, "analyzer task aborted");
            None
        }
    }
}

/// Actionable advice derived from whatever sub-reports are present.
pub fn recommendations(report: &AnalysisReport) -> Vec<String> {
    let mut recs = Vec::new();

    if let Some(security) = &report.security {
        if security.high_severity > 0 {
            recs.push(format!(
                "Address {} high severity security issues",
                security.high_severity
            ));
        }
        if security.medium_severity > 0 {
            recs.push(format!(
                "Review {} medium severity security issues",
                security.medium_severity
            ));
        }

        let sensitive = security.count_of(FindingKind::SensitiveFile);
        if sensitive > 0 {
            recs.push(format!("Remove {sensitive} sensitive files from the image"));
        }
        let secrets = security.count_of(FindingKind::HardcodedSecret);
        if secrets > 0 {
            recs.push(format!("Remove {secrets} hardcoded secrets from the image"));
        }
        let packages = security.count_of(FindingKind::VulnerablePackage);
        if packages > 0 {
            recs.push(format!("Update {packages} vulnerable packages"));
        }
    }

    if let Some(size) = &report.size {
        if size.total_size > LARGE_IMAGE_BYTES {
            recs.push("Consider reducing the image size".to_string());

            if let Some(largest) = size
                .largest_files
                .first()
                .filter(|f| f.size > LARGE_FILE_BYTES)
            {
                recs.push(format!(
                    "Remove or optimize large files (largest: {}, {})",
                    largest.path,
                    format_size(largest.size)
                ));
            }

            for ext in REMOVABLE_EXTENSIONS {
                let bytes = size.file_type_breakdown.get(*ext).copied().unwrap_or(0);
                if bytes > REMOVABLE_BUCKET_BYTES {
                    recs.push(format!(
                        "Remove unnecessary {ext} files ({})",
                        format_size(bytes)
                    ));
                }
            }
        }

        if size.layer_sizes.len() > MAX_LAYERS {
            recs.push("Reduce the number of layers in the image".to_string());
        }
    }

    if recs.is_empty() {
        recs.push(NO_RECOMMENDATIONS.to_string());
    }
    recs
}
