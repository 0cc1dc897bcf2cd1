mod common;

use shuck::analyzer::{FindingKind, Severity, SizeOptions};
use shuck::report::NO_RECOMMENDATIONS;
use shuck::{AnalyzeOptions, unpack};
use tempfile::TempDir;

use common::saved_image;

async fn analyze_fixture(opts: &AnalyzeOptions) -> shuck::AnalysisReport {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let tarball = saved_image(src.path(), false);
    let root = unpack::unpack_tarball(&tarball, dest.path()).unwrap();
    shuck::analyze("./image.tar", &root, opts).await
}

#[tokio::test]
async fn end_to_end_report() {
    let report = analyze_fixture(&AnalyzeOptions::default()).await;
    assert_eq!(report.image, "./image.tar");

    let dir = report.directory.as_ref().unwrap();
    assert_eq!(dir.file_types.values().sum::<u64>(), dir.file_count);
    // manifest + 2 layer tarballs + 2 + 4 extracted files
    assert_eq!(dir.file_count, 9);

    let sec = report.security.as_ref().unwrap();
    let found: Vec<(FindingKind, &str, Severity)> = sec
        .issues
        .iter()
        .map(|f| (f.kind, f.location.as_str(), f.severity))
        .collect();
    assert_eq!(
        found,
        [
            (FindingKind::SensitiveFile, "bbb/extracted/etc/.env", Severity::High),
            (FindingKind::HardcodedSecret, "bbb/extracted/app/config.js:1", Severity::High),
            (
                FindingKind::VulnerablePackage,
                "bbb/extracted/app/package.json: lodash@4.17.20",
                Severity::High
            ),
        ]
    );
    assert_eq!(sec.total_issues, 3);
    assert_eq!(sec.high_severity + sec.medium_severity + sec.low_severity, 3);

    let size = report.size.as_ref().unwrap();
    assert_eq!(size.layer_sizes.len(), 2);
    assert!(size.layer_sizes[0].size >= size.layer_sizes[1].size);
    assert!(size.largest_files.len() <= SizeOptions::default().top_files);

    assert_eq!(
        report.recommendations,
        [
            "Address 3 high severity security issues",
            "Remove 1 sensitive files from the image",
            "Remove 1 hardcoded secrets from the image",
            "Update 1 vulnerable packages",
        ]
    );
}

#[tokio::test]
async fn verbose_lists_every_path() {
    let opts = AnalyzeOptions {
        verbose: true,
        ..AnalyzeOptions::default()
    };
    let report = analyze_fixture(&opts).await;
    let dir = report.directory.unwrap();

    let files = dir.files.unwrap();
    let dirs = dir.dirs.unwrap();
    assert_eq!(files.len() as u64, dir.file_count);
    assert_eq!(dirs.len() as u64, dir.dir_count);
    assert!(files.windows(2).all(|w| w[0] <= w[1]));
    assert!(files.contains(&"aaa/extracted/bin/sh".to_string()));
}

#[tokio::test]
async fn clean_image_gets_the_fallback_recommendation() {
    let opts = AnalyzeOptions {
        security_enabled: false,
        ..AnalyzeOptions::default()
    };
    let report = analyze_fixture(&opts).await;
    assert!(report.security.is_none());
    assert_eq!(report.recommendations, [NO_RECOMMENDATIONS]);
}
