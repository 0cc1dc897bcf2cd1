use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::archive;
use super::save::ImageSaver;
use crate::error::{Error, Result};

/// File name of a per-layer tarball in the saved-image layout.
pub const LAYER_TARBALL: &str = "layer.tar";

/// Directory next to each `layer.tar` that receives its contents.
pub const EXTRACTED_DIR: &str = "extracted";

/// Subdirectory of the destination that receives the outer tarball.
pub const IMAGE_DIR: &str = "image";

/// A reference is a named image (to be saved by a runtime) when it has no
/// `/` at all or carries a `:` tag/port separator. Anything else is a path.
pub fn is_named_image(reference: &str) -> bool {
    !reference.contains('/') || reference.contains(':')
}

/// Unpack `reference` under `dest` and return the image root
/// (`<dest>/image`).
///
/// Named images are first saved to a temporary tarball through `saver`;
/// that tarball is removed afterwards whether or not extraction succeeds.
/// Any failure is fatal: nothing partial is returned.
pub fn unpack_image(reference: &str, dest: &Path, saver: &dyn ImageSaver) -> Result<PathBuf> {
    if is_named_image(reference) {
        let tarball = saver.save(reference)?;
        let result = unpack_tarball(&tarball, dest);
        discard_saved(&tarball);
        result
    } else {
        unpack_tarball(Path::new(reference), dest)
    }
}

fn discard_saved(tarball: &Path) {
    if let Err(err) = fs::remove_file(tarball) {
        debug!(tarball = %tarball.display(), error = %err, "could not remove saved tarball");
    }
}

/// Extract an image tarball into `<dest>/image`, then expand every
/// `<dest>/image/*/layer.tar` into its sibling `extracted/` directory.
///
/// `<dest>/image` must not exist yet, so a tree left by an earlier run is
/// never merged into this one.
pub fn unpack_tarball(tarball: &Path, dest: &Path) -> Result<PathBuf> {
    let image_dir = dest.join(IMAGE_DIR);
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    fs::create_dir(&image_dir).map_err(|e| Error::io(&image_dir, e))?;
    info!(tarball = %tarball.display(), dest = %image_dir.display(), "extracting image");
    archive::extract_file(tarball, &image_dir)?;

    let layers = find_layer_tarballs(&image_dir)?;
    debug!(count = layers.len(), "found layer tarballs");

    for layer in &layers {
        let extracted = layer
            .parent()
            .map(|dir| dir.join(EXTRACTED_DIR))
            .unwrap_or_else(|| image_dir.join(EXTRACTED_DIR));
        debug!(layer = %layer.display(), "extracting layer");
        archive::extract_file(layer, &extracted).map_err(|source| Error::Layer {
            path: layer.clone(),
            source: Box::new(source),
        })?;
    }

    Ok(image_dir)
}

/// Paths matching `<root>/*/layer.tar`, sorted by directory name.
///
/// A missing `layer.tar` in a subdirectory is not an error; a layout with no
/// layer directories simply yields an empty list. Only regular files count,
/// so a symlink or directory named `layer.tar` is ignored.
pub fn find_layer_tarballs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<_> = fs::read_dir(root)
        .map_err(|e| Error::io(root, e))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::io(root, e))?;
    entries.sort_by_key(|e| e.file_name());

    Ok(entries
        .into_iter()
        .map(|e| e.path().join(LAYER_TARBALL))
        .filter(|p| fs::symlink_metadata(p).is_ok_and(|m| m.is_file()))
        .collect())
}
