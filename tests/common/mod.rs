#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Tar bytes holding `files` as regular 0644 entries.
pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Tar bytes with one entry whose name is written verbatim into the header,
/// so `..` components survive.
pub fn hostile_tar(name: &str, data: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data).unwrap();
    builder.into_inner().unwrap()
}

pub const APP_LAYER: &[(&str, &[u8])] = &[
    ("etc/.env", b"DATABASE_URL=postgres://db\n"),
    ("app/config.js", b"const password = 'supersecretpw';\n"),
    (
        "app/package.json",
        br#"{"dependencies": {"lodash": "4.17.20", "express": "4.18.2"}}"#,
    ),
    ("app/README", b"hello\n"),
];

pub const BASE_LAYER: &[(&str, &[u8])] = &[
    ("bin/sh", b"\x7fELF\0\0\0binary"),
    ("etc/os-release", b"ID=test\n"),
];

/// A saved-image tarball with two layer directories, written into `dir`.
pub fn saved_image(dir: &Path, gzip: bool) -> PathBuf {
    let base = tar_bytes(BASE_LAYER);
    let app = tar_bytes(APP_LAYER);
    let outer = tar_bytes(&[
        ("manifest.json", br#"[{"Layers":["aaa/layer.tar","bbb/layer.tar"]}]"#.as_slice()),
        ("aaa/layer.tar", base.as_slice()),
        ("bbb/layer.tar", app.as_slice()),
    ]);

    if gzip {
        let path = dir.join("image.tar.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&outer).unwrap();
        fs::write(&path, enc.finish().unwrap()).unwrap();
        path
    } else {
        let path = dir.join("image.tar");
        fs::write(&path, outer).unwrap();
        path
    }
}
