//! Read-only analyses over an unpacked image tree.

pub mod directory;
pub mod security;
pub mod size;

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};

pub use directory::{DirectoryReport, analyze_directory};
pub use security::{
    FindingKind, SecurityFinding, SecurityReport, SecurityRules, Severity, analyze_security,
};
pub use size::{LayerMeasurement, SizeEntry, SizeOptions, SizeReport, analyze_size};

/// Histogram bucket for files without an extension.
pub const NO_EXTENSION: &str = "[no extension]";

/// Lowercased suffix of the file name starting at its last `.`
/// (`app.JS` -> `.js`, `.env` -> `.env`), or [`NO_EXTENSION`].
pub fn extension_bucket(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(idx) => name[idx..].to_lowercase(),
        None => NO_EXTENSION.to_string(),
    }
}

/// Depth-first walk in file-name order, not following symlinks. The root
/// itself is yielded first (depth 0).
pub(crate) fn walk(root: &Path) -> impl Iterator<Item = Result<DirEntry>> + '_ {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .map(move |entry| entry.map_err(|e| Error::walk(root, e)))
}

/// `entry`'s path relative to `root`, `/`-separated.
pub(crate) fn relative(root: &Path, entry: &DirEntry) -> String {
    entry
        .path()
        .strip_prefix(root)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .into_owned()
}

/// Size of a non-directory entry. Symlinks report their own size.
pub(crate) fn entry_size(root: &Path, entry: &DirEntry) -> Result<u64> {
    entry
        .metadata()
        .map(|m| m.len())
        .map_err(|e| Error::walk(root, e))
}
