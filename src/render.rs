//! Text and JSON renderings of an [`AnalysisReport`].

use std::io::{self, Write};

use crate::report::AnalysisReport;

const UNITS: &[(&str, u64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

/// Human-readable size in binary units with two decimals: `0.00 B`,
/// `1.50 KB`, `600.00 MB`.
pub fn format_size(bytes: u64) -> String {
    for &(unit, scale) in UNITS {
        if bytes >= scale {
            return format!("{:.2} {unit}", bytes as f64 / scale as f64);
        }
    }
    format!("{:.2} B", bytes as f64)
}

pub fn to_json(report: &AnalysisReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Plain-text summary: header, one section per present sub-report, then
/// the recommendations.
pub fn write_text<W: Write>(report: &AnalysisReport, out: &mut W) -> io::Result<()> {
    writeln!(out, "Image Analysis: {}", report.image)?;
    writeln!(out, "Analyzed at: {}", report.analyzed_at)?;
    writeln!(out)?;

    if let Some(dir) = &report.directory {
        writeln!(out, "Directory Structure:")?;
        writeln!(out, "  Files: {}", dir.file_count)?;
        writeln!(out, "  Directories: {}", dir.dir_count)?;
        writeln!(out, "  Total Size: {}", format_size(dir.size))?;
        if !dir.file_types.is_empty() {
            writeln!(out, "  File Types:")?;
            for (ext, count) in &dir.file_types {
                writeln!(out, "    {ext}: {count} files")?;
            }
        }
        if let Some(files) = &dir.files {
            writeln!(out, "  Files Found:")?;
            for file in files {
                writeln!(out, "    {file}")?;
            }
        }
        if let Some(dirs) = &dir.dirs {
            writeln!(out, "  Directories Found:")?;
            for d in dirs {
                writeln!(out, "    {d}")?;
            }
        }
        writeln!(out)?;
    }

    if let Some(sec) = &report.security {
        writeln!(out, "Security Analysis:")?;
        writeln!(out, "  Total Issues: {}", sec.total_issues)?;
        writeln!(out, "  High Severity: {}", sec.high_severity)?;
        writeln!(out, "  Medium Severity: {}", sec.medium_severity)?;
        writeln!(out, "  Low Severity: {}", sec.low_severity)?;
        if !sec.issues.is_empty() {
            writeln!(out, "  Issues:")?;
            for issue in &sec.issues {
                writeln!(
                    out,
                    "    [{}] {}: {} ({})",
                    issue.severity, issue.kind, issue.description, issue.location
                )?;
            }
        }
        writeln!(out)?;
    }

    if let Some(size) = &report.size {
        writeln!(out, "Size Analysis:")?;
        writeln!(out, "  Total Size: {}", format_size(size.total_size))?;
        if !size.layer_sizes.is_empty() {
            writeln!(out, "  Layer Sizes:")?;
            for layer in &size.layer_sizes {
                writeln!(out, "    {}: {}", layer.id, format_size(layer.size))?;
            }
        }
        if !size.largest_files.is_empty() {
            writeln!(out, "  Largest Files:")?;
            for file in &size.largest_files {
                writeln!(out, "    {}: {}", file.path, format_size(file.size))?;
            }
        }
        if !size.largest_dirs.is_empty() {
            writeln!(out, "  Largest Directories:")?;
            for dir in &size.largest_dirs {
                writeln!(out, "    {}: {}", dir.path, format_size(dir.size))?;
            }
        }
        if !size.file_type_breakdown.is_empty() {
            writeln!(out, "  File Type Breakdown:")?;
            for (ext, bytes) in &size.file_type_breakdown {
                writeln!(out, "    {ext}: {}", format_size(*bytes))?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "Recommendations:")?;
    for rec in &report.recommendations {
        writeln!(out, "  - {rec}")?;
    }
    Ok(())
}
