use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{entry_size, extension_bucket, relative, walk};
use crate::error::{Error, Result};
use crate::unpack::image::find_layer_tarballs;

/// How many entries the rankings keep. Zero keeps everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeOptions {
    pub top_files: usize,
    pub top_dirs: usize,
}

impl Default for SizeOptions {
    fn default() -> Self {
        Self {
            top_files: 10,
            top_dirs: 5,
        }
    }
}

/// Raw size of one `layer.tar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMeasurement {
    /// Name of the directory holding the layer tarball
    pub id: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    pub total_size: u64,

    /// Largest first
    pub layer_sizes: Vec<LayerMeasurement>,

    /// Largest first, at most `top_files` entries
    pub largest_files: Vec<SizeEntry>,

    /// Largest first, at most `top_dirs` entries
    pub largest_dirs: Vec<SizeEntry>,

    /// Lowercase extension -> cumulative bytes
    pub file_type_breakdown: BTreeMap<String, u64>,
}

/// Measure where the bytes of an unpacked tree are.
///
/// Directory sizes are accumulated bottom-up in the same walk that collects
/// file sizes; each directory's figure equals a full recursive walk of it.
/// All rankings are stable sorts on size, so ties keep walk order.
pub fn analyze_size(root: &Path, opts: SizeOptions) -> Result<SizeReport> {
    let layer_sizes = layer_sizes(root)?;

    let mut total_size = 0u64;
    let mut files: Vec<SizeEntry> = Vec::new();
    let mut dirs: Vec<SizeEntry> = Vec::new();
    let mut dir_index: HashMap<PathBuf, usize> = HashMap::new();
    let mut file_type_breakdown: BTreeMap<String, u64> = BTreeMap::new();

    for entry in walk(root) {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());

        if entry.file_type().is_dir() {
            dir_index.insert(rel.to_path_buf(), dirs.len());
            dirs.push(SizeEntry {
                path: relative(root, &entry),
                size: 0,
            });
            continue;
        }

        let size = entry_size(root, &entry)?;
        total_size += size;
        *file_type_breakdown
            .entry(extension_bucket(entry.path()))
            .or_default() += size;

        // Pre-order walk: every ancestor directory is already indexed.
        for ancestor in rel.ancestors().skip(1) {
            if let Some(&idx) = dir_index.get(ancestor) {
                dirs[idx].size += size;
            }
        }

        files.push(SizeEntry {
            path: relative(root, &entry),
            size,
        });
    }

    let report = SizeReport {
        total_size,
        layer_sizes,
        largest_files: top_k(files, opts.top_files),
        largest_dirs: top_k(dirs, opts.top_dirs),
        file_type_breakdown,
    };

    debug!(
        bytes = report.total_size,
        layers = report.layer_sizes.len(),
        "size analysis done"
    );
    Ok(report)
}

/// Size of every `<root>/*/layer.tar`, largest first.
pub fn layer_sizes(root: &Path) -> Result<Vec<LayerMeasurement>> {
    let mut layers = Vec::new();

    for tarball in find_layer_tarballs(root)? {
        let size = fs::metadata(&tarball)
            .map_err(|e| Error::io(&tarball, e))?
            .len();
        let id = tarball
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        layers.push(LayerMeasurement { id, size });
    }

    layers.sort_by(|a, b| b.size.cmp(&a.size));
    Ok(layers)
}

fn top_k(mut entries: Vec<SizeEntry>, k: usize) -> Vec<SizeEntry> {
    entries.sort_by(|a, b| b.size.cmp(&a.size));
    if k > 0 {
        entries.truncate(k);
    }
    entries
}
