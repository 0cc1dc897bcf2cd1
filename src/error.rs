//! Error types for unpacking and analysis.

use std::io;
use std::path::{Path, PathBuf};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an unpack or a whole analyzer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed tar header, truncated stream or bad gzip data.
    #[error("malformed archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Archive entry resolves outside the extraction root.
    #[error("path traversal detected in archive entry: {entry}")]
    PathTraversal { entry: String },

    /// A layer tarball inside the image failed to extract.
    #[error("failed to extract layer {}: {source}", path.display())]
    Layer {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The container runtime could not save a named image.
    #[error("failed to save image '{image}': {reason}")]
    Materialize { image: String, reason: String },

    /// Directory traversal failed.
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// User-supplied secret pattern did not compile.
    #[error("invalid secret pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn archive(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Archive {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn walk(root: impl AsRef<Path>, source: walkdir::Error) -> Self {
        let path = source
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.as_ref().to_path_buf());
        Error::Walk { path, source }
    }

    /// True for the path-containment failure, which is never recovered.
    pub fn is_path_traversal(&self) -> bool {
        match self {
            Error::PathTraversal { .. } => true,
            Error::Layer { source, .. } => source.is_path_traversal(),
            _ => false,
        }
    }
}

/// A failure confined to one file. The caller logs it and moves on to the
/// next item; it never aborts the analyzer.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl ItemError {
    pub(crate) fn unreadable(path: impl AsRef<Path>, source: io::Error) -> Self {
        ItemError::Unreadable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        ItemError::Malformed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
