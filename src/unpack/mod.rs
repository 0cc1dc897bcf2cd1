//! Turning an image reference into an unpacked directory tree.
//!
//! [`archive`] streams a single tar or tar.gz into a directory with path
//! containment. [`image`] drives it twice: once over the saved image
//! tarball and once over every `*/layer.tar` found inside. [`save`]
//! materializes named images through a container runtime first.

pub mod archive;
pub mod image;
pub mod save;

pub use image::{is_named_image, unpack_image, unpack_tarball};
pub use save::{ImageSaver, RuntimeKind, RuntimeSaver};
