use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::EntryType;
use tracing::trace;

use crate::error::{Error, Result};

/// Whether an archive should be read through a gzip decoder, judged by name.
pub fn is_gzip_name(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".gz") || name.ends_with(".tgz")
}

/// Extract a tar (or `.gz` / `.tgz`) file on disk into `dest`.
pub fn extract_file(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let reader = BufReader::new(file);

    if is_gzip_name(archive) {
        extract(GzDecoder::new(reader), dest, archive)
    } else {
        extract(reader, dest, archive)
    }
}

/// Stream every entry of a tar archive into `dest`, one entry at a time.
///
/// Directories, regular files and symlinks are materialized; other entry
/// kinds are skipped. Any entry whose name escapes `dest`, lexically or
/// through a symlink already on disk, aborts the whole extraction before
/// that entry is written. `source` only names the archive in errors.
pub fn extract<R: Read>(reader: R, dest: &Path, source: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    let root = fs::canonicalize(dest).map_err(|e| Error::io(dest, e))?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let entries = archive.entries().map_err(|e| Error::archive(source, e))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| Error::archive(source, e))?;
        let name = entry
            .path()
            .map_err(|e| Error::archive(source, e))?
            .into_owned();
        let target = contained_path(dest, &name)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                resolves_inside(&root, dest, &target, &name)?;
                create_dir(&target)?;
            }
            EntryType::Regular | EntryType::Symlink => {
                resolves_inside(&root, dest, &target, &name)?;
                if let Some(parent) = target.parent() {
                    create_dir(parent)?;
                }
                // An existing symlink at `target` is replaced, not followed.
                entry.unpack(&target).map_err(|e| Error::io(&target, e))?;
            }
            other => trace!(entry = %name.display(), kind = ?other, "skipping entry"),
        }
    }

    Ok(())
}

/// Check the real location of `target`'s parent against `root` (the
/// canonical `dest`).
///
/// The nearest ancestor that already exists is canonicalized, so a
/// symlink planted by an earlier entry cannot carry the write outside.
/// Directories that do not exist yet are created under that ancestor.
fn resolves_inside(root: &Path, dest: &Path, target: &Path, name: &Path) -> Result<()> {
    let Some(parent) = target.parent().filter(|_| target != dest) else {
        return Ok(());
    };

    for dir in parent.ancestors() {
        match fs::symlink_metadata(dir) {
            Ok(_) => {
                let real = fs::canonicalize(dir).map_err(|e| Error::io(dir, e))?;
                return if real.starts_with(root) {
                    Ok(())
                } else {
                    Err(traversal(name))
                };
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::io(dir, e)),
        }
    }

    Err(traversal(name))
}

/// Join `name` onto `dest`, resolving `.` and `..` lexically.
///
/// Fails with [`Error::PathTraversal`] if the name is absolute or climbs
/// above `dest`. The filesystem is not consulted.
pub fn contained_path(dest: &Path, name: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&OsStr> = Vec::new();

    for component in name.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(traversal(name));
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal(name)),
        }
    }

    let mut target = dest.to_path_buf();
    target.extend(parts);
    Ok(target)
}

fn traversal(name: &Path) -> Error {
    Error::PathTraversal {
        entry: name.display().to_string(),
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    use super::*;

    fn append_file(builder: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_entry_type(EntryType::Regular);
        builder.append_data(&mut header, name, data).unwrap();
    }

    /// Writes the name bytes straight into the header so `..` and absolute
    /// names survive (the builder refuses them).
    fn append_raw(builder: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    #[test]
    fn contained_path_resolves_dots_lexically() {
        let dest = Path::new("/out");
        assert_eq!(
            contained_path(dest, Path::new("a/./b/../c")).unwrap(),
            PathBuf::from("/out/a/c")
        );
        assert_eq!(contained_path(dest, Path::new("a/..")).unwrap(), PathBuf::from("/out"));
    }

    #[test]
    fn contained_path_rejects_escapes() {
        let dest = Path::new("/out");
        for name in ["../x", "a/../../x", "/etc/passwd"] {
            let err = contained_path(dest, Path::new(name)).unwrap_err();
            assert!(err.is_path_traversal(), "{name} should be rejected");
        }
    }

    #[test]
    fn gzip_detected_by_suffix() {
        assert!(is_gzip_name(Path::new("img.tar.gz")));
        assert!(is_gzip_name(Path::new("img.tgz")));
        assert!(!is_gzip_name(Path::new("img.tar")));
        assert!(!is_gzip_name(Path::new("layer.tar")));
    }

    #[test]
    fn extracts_dirs_files_and_symlinks() {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder.append_data(&mut dir, "etc/", io::empty()).unwrap();

        append_file(&mut builder, "etc/hosts", b"127.0.0.1 localhost\n", 0o644);
        append_file(&mut builder, "usr/bin/tool", b"#!/bin/sh\n", 0o755);

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder
            .append_link(&mut link, "bin/tool", "../usr/bin/tool")
            .unwrap();

        let data = builder.into_inner().unwrap();
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");

        extract(&data[..], &dest, Path::new("test.tar")).unwrap();

        assert!(dest.join("etc").is_dir());
        assert_eq!(
            fs::read_to_string(dest.join("etc/hosts")).unwrap(),
            "127.0.0.1 localhost\n"
        );
        let mode = fs::metadata(dest.join("usr/bin/tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        assert_eq!(
            fs::read_link(dest.join("bin/tool")).unwrap(),
            PathBuf::from("../usr/bin/tool")
        );
    }

    #[test]
    fn traversal_entry_aborts_before_writing() {
        let mut builder = tar::Builder::new(Vec::new());
        append_file(&mut builder, "ok.txt", b"fine", 0o644);
        append_raw(&mut builder, "../escaped.txt", b"evil");
        append_file(&mut builder, "after.txt", b"never", 0o644);
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let err = extract(&data[..], &dest, Path::new("evil.tar")).unwrap_err();

        assert!(err.is_path_traversal());
        assert!(dest.join("ok.txt").exists());
        assert!(!tmp.path().join("escaped.txt").exists());
        assert!(!dest.join("after.txt").exists());
    }

    fn append_symlink(builder: &mut tar::Builder<Vec<u8>>, name: &str, link: &Path) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, name, link).unwrap();
    }

    #[test]
    fn symlinked_parent_cannot_redirect_writes() {
        let outside = TempDir::new().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        append_symlink(&mut builder, "esc", outside.path());
        append_file(&mut builder, "esc/pwned.txt", b"evil", 0o644);
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let err = extract(&data[..], &dest, Path::new("link.tar")).unwrap_err();

        assert!(matches!(err, Error::PathTraversal { ref entry } if entry == "esc/pwned.txt"));
        assert!(!outside.path().join("pwned.txt").exists());
        assert!(fs::symlink_metadata(dest.join("esc")).unwrap().file_type().is_symlink());
    }

    #[test]
    fn symlinked_parent_cannot_host_directories() {
        let outside = TempDir::new().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        append_symlink(&mut builder, "esc", outside.path());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        builder.append_data(&mut dir, "esc/sub/", io::empty()).unwrap();
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let err = extract(&data[..], &tmp.path().join("out"), Path::new("link.tar")).unwrap_err();

        assert!(err.is_path_traversal());
        assert!(!outside.path().join("sub").exists());
    }

    #[test]
    fn file_over_symlink_replaces_the_link() {
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("hosts");
        fs::write(&victim, "original").unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        append_symlink(&mut builder, "hosts", &victim);
        append_file(&mut builder, "hosts", b"replaced", 0o644);
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        extract(&data[..], &dest, Path::new("link.tar")).unwrap();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "original");
        assert!(fs::symlink_metadata(dest.join("hosts")).unwrap().is_file());
        assert_eq!(fs::read_to_string(dest.join("hosts")).unwrap(), "replaced");
    }

    #[test]
    fn inner_dotdot_lands_inside() {
        let mut builder = tar::Builder::new(Vec::new());
        append_raw(&mut builder, "a/../b.txt", b"ok");
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        extract(&data[..], tmp.path(), Path::new("dots.tar")).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("b.txt")).unwrap(), "ok");
    }

    #[test]
    fn absolute_entry_is_traversal() {
        let mut builder = tar::Builder::new(Vec::new());
        append_raw(&mut builder, "/abs.txt", b"evil");
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let err = extract(&data[..], tmp.path(), Path::new("abs.tar")).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { ref entry } if entry == "/abs.txt"));
    }

    #[test]
    fn extract_file_reads_gzip_by_name() {
        let mut builder = tar::Builder::new(Vec::new());
        append_file(&mut builder, "hello.txt", b"hi", 0o644);
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bundle.tar.gz");
        let mut gz = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        gz.write_all(&data).unwrap();
        gz.finish().unwrap();

        let dest = tmp.path().join("out");
        extract_file(&archive, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("hello.txt")).unwrap(), "hi");
    }

    #[test]
    fn truncated_header_is_archive_error() {
        let mut builder = tar::Builder::new(Vec::new());
        append_file(&mut builder, "big.bin", &[7u8; 4096], 0o644);
        let data = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let err = extract(&data[..256], tmp.path(), Path::new("cut.tar")).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }
}
