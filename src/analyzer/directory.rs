use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{entry_size, extension_bucket, relative, walk};
use crate::error::Result;

/// Aggregate shape of an unpacked tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryReport {
    /// Root that was walked.
    pub path: PathBuf,

    /// Sum of all non-directory entry sizes, in bytes
    pub size: u64,

    pub file_count: u64,

    pub dir_count: u64,

    /// Lowercase extension -> number of files
    pub file_types: BTreeMap<String, u64>,

    /// Every file's relative path, sorted. Present only in verbose mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    /// Every directory's relative path, sorted. Present only in verbose mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirs: Option<Vec<String>>,
}

/// Walk `root` once and count what is under it.
///
/// Every entry below the root is either a directory or a file (symlinks and
/// other non-directories count as files). Any walk error aborts.
pub fn analyze_directory(root: &Path, verbose: bool) -> Result<DirectoryReport> {
    let mut report = DirectoryReport {
        path: root.to_path_buf(),
        size: 0,
        file_count: 0,
        dir_count: 0,
        file_types: BTreeMap::new(),
        files: verbose.then(Vec::new),
        dirs: verbose.then(Vec::new),
    };

    for entry in walk(root) {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        if entry.file_type().is_dir() {
            report.dir_count += 1;
            if let Some(dirs) = report.dirs.as_mut() {
                dirs.push(relative(root, &entry));
            }
            continue;
        }

        report.file_count += 1;
        report.size += entry_size(root, &entry)?;
        *report
            .file_types
            .entry(extension_bucket(entry.path()))
            .or_default() += 1;
        if let Some(files) = report.files.as_mut() {
            files.push(relative(root, &entry));
        }
    }

    if let Some(files) = report.files.as_mut() {
        files.sort();
    }
    if let Some(dirs) = report.dirs.as_mut() {
        dirs.sort();
    }

    debug!(
        files = report.file_count,
        dirs = report.dir_count,
        bytes = report.size,
        "directory analysis done"
    );
    Ok(report)
}
